//! Client and poller configuration

use crate::{Result, StkPayError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default backend URL used when nothing else is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";

/// Default interval between two status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable names read by [`ClientConfig::from_env`] and [`PollConfig::from_env`]
pub mod env_vars {
    pub const API_BASE_URL: &str = "STKPAY_API_BASE_URL";
    pub const TIMEOUT_SECS: &str = "STKPAY_TIMEOUT_SECS";
    pub const TOKEN_FILE: &str = "STKPAY_TOKEN_FILE";
    pub const POLL_INTERVAL_SECS: &str = "STKPAY_POLL_INTERVAL_SECS";
    pub const POLL_RETRIES: &str = "STKPAY_POLL_RETRIES";
    pub const POLL_MAX_WAIT_SECS: &str = "STKPAY_POLL_MAX_WAIT_SECS";
}

/// Configuration of the dashboard API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the dashboard backend
    pub base_url: String,
    /// Request timeout
    pub timeout: Option<Duration>,
    /// File the session token is persisted to; in-memory when unset
    pub token_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Create a new client config
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            token_file: None,
        }
    }

    /// Load the config from `STKPAY_*` environment variables
    pub fn from_env() -> Result<Self> {
        let base_url =
            env::var(env_vars::API_BASE_URL).unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        let mut config = Self::new(base_url);

        if let Some(secs) = parse_env::<u64>(env_vars::TIMEOUT_SECS)? {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Ok(path) = env::var(env_vars::TOKEN_FILE) {
            config = config.with_token_file(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the client configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(StkPayError::config("API base URL cannot be empty"));
        }

        let url = Url::parse(&self.base_url)
            .map_err(|e| StkPayError::config(format!("Invalid API base URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(StkPayError::config(
                "API base URL must start with http:// or https://",
            ));
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(StkPayError::config("Request timeout must be non-zero"));
        }

        Ok(())
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the request timeout
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Persist the session token to a file
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Join an endpoint path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

/// How poll-time failures are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Any failed poll ends the request as failed
    #[default]
    FailFast,
    /// Retry transient failures up to `max_attempts` consecutive failures
    Bounded { max_attempts: u32 },
}

impl RetryPolicy {
    /// Whether the poller should keep going after `consecutive_failures` failed polls
    pub fn allows_retry(&self, consecutive_failures: u32, error: &StkPayError) -> bool {
        match self {
            RetryPolicy::FailFast => false,
            RetryPolicy::Bounded { max_attempts } => {
                error.is_transient() && consecutive_failures < *max_attempts
            }
        }
    }
}

/// Configuration of the payment status poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed delay between status polls
    pub interval: Duration,
    /// Handling of failed polls
    pub retry_policy: RetryPolicy,
    /// Give up after this long without a terminal status; unbounded when unset
    pub max_wait: Option<Duration>,
}

impl PollConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            retry_policy: RetryPolicy::FailFast,
            max_wait: None,
        }
    }

    /// Load the poll config from `STKPAY_POLL_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(secs) = parse_env::<u64>(env_vars::POLL_INTERVAL_SECS)? {
            config = config.with_interval(Duration::from_secs(secs));
        }
        if let Some(max_attempts) = parse_env::<u32>(env_vars::POLL_RETRIES)? {
            if max_attempts > 0 {
                config = config.with_retry_policy(RetryPolicy::Bounded { max_attempts });
            }
        }
        if let Some(secs) = parse_env::<u64>(env_vars::POLL_MAX_WAIT_SECS)? {
            config = config.with_max_wait(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the poll configuration
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(StkPayError::config("Poll interval must be non-zero"));
        }
        if let RetryPolicy::Bounded { max_attempts: 0 } = self.retry_policy {
            return Err(StkPayError::config(
                "Bounded retry policy needs at least one attempt",
            ));
        }
        if self.max_wait.is_some_and(|d| d.is_zero()) {
            return Err(StkPayError::config("Poll max wait must be non-zero"));
        }
        Ok(())
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StkPayError::config(format!("{} is not a valid number: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.timeout, Some(DEFAULT_REQUEST_TIMEOUT));
        assert!(config.token_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_validation() {
        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::new("ftp://example.com").validate().is_err());
        assert!(ClientConfig::new("not a url").validate().is_err());
        assert!(ClientConfig::new("https://api.example.com")
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_endpoint_joining() {
        let config = ClientConfig::new("https://api.example.com/");
        assert_eq!(config.endpoint("/stk-push"), "https://api.example.com/stk-push");
        assert_eq!(config.endpoint("wallet"), "https://api.example.com/wallet");
    }

    #[test]
    fn test_retry_policy() {
        let transient = StkPayError::backend(502, "bad gateway");
        let denial = StkPayError::backend(400, "denied");

        assert!(!RetryPolicy::FailFast.allows_retry(1, &transient));

        let bounded = RetryPolicy::Bounded { max_attempts: 3 };
        assert!(bounded.allows_retry(1, &transient));
        assert!(bounded.allows_retry(2, &transient));
        assert!(!bounded.allows_retry(3, &transient));
        assert!(!bounded.allows_retry(1, &denial));
    }

    #[test]
    fn test_poll_config_validation() {
        assert!(PollConfig::default().validate().is_ok());
        assert_eq!(PollConfig::default().interval, Duration::from_secs(5));
        assert!(PollConfig::new(Duration::ZERO).validate().is_err());
        assert!(PollConfig::default()
            .with_retry_policy(RetryPolicy::Bounded { max_attempts: 0 })
            .validate()
            .is_err());
    }

    #[test]
    fn test_poll_config_from_env() {
        env::set_var(env_vars::POLL_INTERVAL_SECS, "2");
        env::set_var(env_vars::POLL_RETRIES, "3");
        env::set_var(env_vars::POLL_MAX_WAIT_SECS, "120");
        let config = PollConfig::from_env().unwrap();
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.retry_policy, RetryPolicy::Bounded { max_attempts: 3 });
        assert_eq!(config.max_wait, Some(Duration::from_secs(120)));

        env::set_var(env_vars::POLL_INTERVAL_SECS, "0");
        assert!(PollConfig::from_env().is_err());
        env::set_var(env_vars::POLL_INTERVAL_SECS, "soon");
        assert!(PollConfig::from_env().is_err());

        env::remove_var(env_vars::POLL_INTERVAL_SECS);
        env::remove_var(env_vars::POLL_RETRIES);
        env::remove_var(env_vars::POLL_MAX_WAIT_SECS);
        assert_eq!(PollConfig::from_env().unwrap(), PollConfig::default());
    }
}
