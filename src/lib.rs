//! # stkpay - M-Pesa STK-push dashboard client
//!
//! Async client for a multi-tenant M-Pesa STK-push dashboard backend. It
//! covers authentication, tenant and admin data, and the payment flow: submit
//! a push request, then poll its status until the payer confirms or declines.
//!
//! ```no_run
//! use stkpay::{ClientConfig, DashboardClient, PaymentPoller, PollConfig};
//!
//! # async fn run() -> stkpay::Result<()> {
//! let client = DashboardClient::new(ClientConfig::from_env()?)?;
//! client.login("owner@duka.co.ke", "secret").await?;
//!
//! let poller = PaymentPoller::new(client, PollConfig::default())?;
//! let mut state = poller.subscribe();
//! poller.submit("254712345678", "100").await?;
//! let outcome = state.wait_for(|s| s.is_terminal()).await.map(|s| s.clone());
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod navigation;
pub mod poller;
pub mod session;
pub mod types;

// Re-exports for convenience
pub use client::DashboardClient;
pub use config::{ClientConfig, PollConfig, RetryPolicy};
pub use error::{Result, StkPayError};
pub use gateway::PaymentGateway;
pub use navigation::Navigation;
pub use poller::{Notification, NotificationLevel, PaymentPoller, PaymentState};
pub use session::{AccessToken, Session};
pub use types::*;

/// Current version of the stkpay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_version_constant() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_reexports_compose() {
        let request = PaymentRequest::new("254712345678", Decimal::from(100)).unwrap();
        assert_eq!(request.recipient_phone(), "254712345678");
        assert_eq!(PollConfig::default().retry_policy, RetryPolicy::FailFast);
        assert_eq!(PaymentState::default(), PaymentState::Idle);
    }
}
