//! Error types for the stkpay library

use thiserror::Error;

/// Result type alias for stkpay operations
pub type Result<T> = std::result::Result<T, StkPayError>;

/// Main error type for stkpay operations
#[derive(Error, Debug)]
pub enum StkPayError {
    /// Client-side input validation failed
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Missing, expired or rejected session token
    #[error("Authentication required: {message}")]
    Auth { message: String },

    /// The session is valid but not allowed to perform the operation
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// HTTP transport error (connection refused, DNS, TLS, ...)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response from the backend
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// A newer payment request replaced this one before it was confirmed
    #[error("Payment request superseded by a newer submit")]
    Superseded,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected error
    #[error("Unexpected error: {message}")]
    Unexpected { message: String },
}

impl StkPayError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a backend error for a non-2xx response
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, timeouts and 5xx responses are transient. Client
    /// errors, auth rejections and undecodable bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(e) => !e.is_decode() && !e.is_builder(),
            Self::Timeout => true,
            Self::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the error means the session must be re-established
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Text suitable for a transient user notification.
    ///
    /// Backend and validation errors carry their own message verbatim; other
    /// variants fall back to the display form.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message }
            | Self::Auth { message }
            | Self::Forbidden { message }
            | Self::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
