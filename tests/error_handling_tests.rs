//! Error handling tests for stkpay

use std::time::Duration;
use stkpay::{ClientConfig, PaymentRequest, PollConfig, RetryPolicy, StkPayError};

#[test]
fn test_validation_error() {
    let error = StkPayError::validation("Amount must be greater than zero");

    let error_msg = error.to_string();
    assert!(
        error_msg.contains("Validation error"),
        "Error message MUST contain 'Validation error' - actual: {}",
        error_msg
    );
    assert!(
        error_msg.contains("Amount must be greater than zero"),
        "Error message MUST contain the specific reason - actual: {}",
        error_msg
    );
    assert_eq!(error.user_message(), "Amount must be greater than zero");
    assert!(!error.is_transient());
}

#[test]
fn test_backend_error() {
    let error = StkPayError::backend(400, "Invalid phone");

    let error_msg = error.to_string();
    assert!(
        error_msg.contains("400"),
        "Error message MUST contain the HTTP status - actual: {}",
        error_msg
    );
    assert_eq!(
        error.user_message(),
        "Invalid phone",
        "Backend messages MUST be surfaced verbatim"
    );
    assert!(!error.is_transient(), "4xx responses MUST NOT be retried");
}

#[test]
fn test_server_error_is_transient() {
    let error = StkPayError::backend(503, "Service Unavailable");
    assert!(error.is_transient(), "5xx responses MUST be retryable");
}

#[test]
fn test_auth_error() {
    let error = StkPayError::auth("Not logged in");

    assert!(error.is_auth());
    assert!(
        error.to_string().contains("Authentication required"),
        "Error message MUST contain 'Authentication required' - actual: {}",
        error
    );
    assert!(!StkPayError::forbidden("Admin access required").is_auth());
}

#[test]
fn test_timeout_error() {
    let error = StkPayError::Timeout;

    let error_msg = error.to_string();
    assert!(
        error_msg.contains("timeout"),
        "Error message MUST mention the timeout - actual: {}",
        error_msg
    );
    assert!(error.is_transient());
    assert_eq!(error.user_message(), error_msg);
}

#[test]
fn test_config_error() {
    let error = StkPayError::config("Invalid API base URL: nope");

    let error_msg = error.to_string();
    assert!(
        error_msg.contains("Configuration error"),
        "Error message MUST contain 'Configuration error' - actual: {}",
        error_msg
    );
}

#[test]
fn test_json_error_conversion() {
    let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: StkPayError = parse_err.into();

    assert!(matches!(error, StkPayError::Json(_)));
    assert!(!error.is_transient(), "Undecodable bodies MUST NOT be retried");
}

#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error: StkPayError = io_err.into();

    assert!(matches!(error, StkPayError::Io(_)));
    assert!(error.to_string().contains("denied"));
}

#[test]
fn test_invalid_payment_inputs() {
    let cases = [
        ("", "100", "Phone number is required"),
        ("07x2", "100", "only digits"),
        ("254712345678", "", "Amount is required"),
        ("254712345678", "ten", "not a number"),
        ("254712345678", "0", "greater than zero"),
    ];

    for (phone, amount, expected) in cases {
        let error = PaymentRequest::parse(phone, amount).unwrap_err();
        assert!(
            error.user_message().contains(expected),
            "({:?}, {:?}) MUST fail with '{}' - actual: {}",
            phone,
            amount,
            expected,
            error.user_message()
        );
    }
}

#[test]
fn test_invalid_client_config() {
    let cases = [
        ClientConfig::new(""),
        ClientConfig::new("not a url"),
        ClientConfig::new("ftp://example.com"),
        ClientConfig::new("http://localhost:5000").with_timeout(Duration::ZERO),
    ];

    for config in cases {
        let error = config.validate().unwrap_err();
        assert!(
            matches!(error, StkPayError::Config { .. }),
            "{:?} MUST be rejected as a configuration error - actual: {}",
            config,
            error
        );
    }
}

#[test]
fn test_invalid_poll_config() {
    assert!(PollConfig::new(Duration::ZERO).validate().is_err());
    assert!(PollConfig::default()
        .with_retry_policy(RetryPolicy::Bounded { max_attempts: 0 })
        .validate()
        .is_err());
    assert!(PollConfig::default()
        .with_max_wait(Duration::ZERO)
        .validate()
        .is_err());
}

#[test]
fn test_retry_policy_respects_error_kind() {
    let bounded = RetryPolicy::Bounded { max_attempts: 3 };

    assert!(!RetryPolicy::FailFast.allows_retry(1, &StkPayError::Timeout));
    assert!(bounded.allows_retry(1, &StkPayError::Timeout));
    assert!(bounded.allows_retry(2, &StkPayError::backend(502, "Bad Gateway")));
    assert!(!bounded.allows_retry(3, &StkPayError::Timeout));
    assert!(!bounded.allows_retry(1, &StkPayError::backend(404, "Not found")));
    assert!(!bounded.allows_retry(1, &StkPayError::auth("Token has expired")));
}
