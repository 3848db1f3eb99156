//! HTTP client for the dashboard backend

use crate::config::ClientConfig;
use crate::navigation::Navigation;
use crate::session::Session;
use crate::types::*;
use crate::{Result, StkPayError};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Characters escaped when an identifier is placed in a single path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Fallback file names for spreadsheet exports
const CUSTOMERS_EXPORT_NAME: &str = "customers.xlsx";
const ALL_CUSTOMERS_EXPORT_NAME: &str = "all_customers.xlsx";

/// Client for every dashboard endpoint
#[derive(Debug, Clone)]
pub struct DashboardClient {
    /// Underlying HTTP client
    client: Client,
    /// Backend configuration
    config: ClientConfig,
    /// Session the bearer token is taken from
    session: Arc<Session>,
}

impl DashboardClient {
    /// Create a client; the session is restored from the configured token file if any
    pub fn new(config: ClientConfig) -> Result<Self> {
        let session = match &config.token_file {
            Some(path) => Session::from_file(path)?,
            None => Session::in_memory(),
        };
        Self::with_session(config, Arc::new(session))
    }

    /// Create a client sharing an existing session
    pub fn with_session(config: ClientConfig, session: Arc<Session>) -> Result<Self> {
        config.validate()?;

        let mut client_builder = Client::builder();
        if let Some(timeout) = config.timeout {
            client_builder = client_builder.timeout(timeout);
        }
        let client = client_builder
            .build()
            .map_err(|e| StkPayError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Backend liveness probe
    pub async fn health(&self) -> Result<HealthResponse> {
        let request = self.client.get(self.config.endpoint("/health"));
        let response = self.execute(request, false).await?;
        Ok(response.json().await?)
    }

    /// Log in as a business and adopt the issued token
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        self.login_at("/login", email, password).await
    }

    /// Log in as an administrator and adopt the issued token
    pub async fn admin_login(&self, email: &str, password: &str) -> Result<()> {
        self.login_at("/admin/login", email, password).await
    }

    async fn login_at(&self, path: &str, email: &str, password: &str) -> Result<()> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(StkPayError::validation("Email and password are required"));
        }
        let credentials = Credentials {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let request = self.client.post(self.config.endpoint(path)).json(&credentials);
        let response = self.execute(request, false).await?;
        let token: TokenResponse = response.json().await?;
        self.session.acquire(token.access_token)?;
        info!("Logged in via {}", path);
        Ok(())
    }

    /// Register a new business
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<String> {
        if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(StkPayError::validation("Name, email and password are required"));
        }
        let body = SignupRequest {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let request = self.client.post(self.config.endpoint("/signup")).json(&body);
        let response = self.execute(request, false).await?;
        let ack: MessageResponse = response.json().await?;
        Ok(ack.message)
    }

    /// Forget the current session
    pub fn logout(&self) -> Result<()> {
        info!("Logging out");
        self.session.clear()
    }

    /// Profile of the logged-in account
    pub async fn profile(&self) -> Result<Profile> {
        self.get_json("/dashboard").await
    }

    /// Fetch the profile and resolve the role's navigation
    pub async fn navigation(&self) -> Result<Navigation> {
        let profile = self.profile().await?;
        Navigation::for_profile(&profile)
    }

    /// Ask the backend to push a payment prompt to the payer's phone
    pub async fn stk_push(&self, payment: &PaymentRequest) -> Result<StkPushResponse> {
        debug!(
            "Sending STK push of {} to {}",
            payment.amount(),
            payment.recipient_phone()
        );
        self.post_json("/stk-push", payment).await
    }

    /// Current status of an initiated push
    pub async fn transaction_status(&self, checkout_id: &CheckoutId) -> Result<PaymentStatus> {
        let path = format!(
            "/transaction-status/{}",
            utf8_percent_encode(checkout_id.as_str(), PATH_SEGMENT)
        );
        let response: TransactionStatusResponse = self.get_json(&path).await?;
        Ok(response.status)
    }

    pub async fn customers(&self) -> Result<Vec<Customer>> {
        self.get_json("/customers").await
    }

    /// Download the business's customers as a spreadsheet
    pub async fn export_customers_excel(&self) -> Result<ExportFile> {
        self.download("/customers/export-excel", CUSTOMERS_EXPORT_NAME)
            .await
    }

    pub async fn wallet(&self) -> Result<WalletInfo> {
        self.get_json("/wallet").await
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.get_json("/settings").await
    }

    /// Store new Daraja credentials; the backend replies with the outcome of its test push
    pub async fn update_settings(&self, settings: &Settings) -> Result<String> {
        settings.validate()?;
        let ack: MessageResponse = self.post_json("/settings/update", settings).await?;
        Ok(ack.message)
    }

    pub async fn admin_businesses(&self) -> Result<Vec<Business>> {
        self.get_json("/admin/businesses").await
    }

    pub async fn admin_transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.get_json("/admin/transactions").await
    }

    pub async fn admin_commissions(&self) -> Result<Vec<CommissionEntry>> {
        self.get_json("/admin/commissions").await
    }

    pub async fn suspend_business(&self, business_id: u64) -> Result<String> {
        let ack: MessageResponse = self
            .post_json(&format!("/admin/suspend/{}", business_id), &Value::Null)
            .await?;
        Ok(ack.message)
    }

    pub async fn reactivate_business(&self, business_id: u64) -> Result<String> {
        let ack: MessageResponse = self
            .post_json(&format!("/admin/reactivate/{}", business_id), &Value::Null)
            .await?;
        Ok(ack.message)
    }

    /// Set the platform commission rate, in percent
    pub async fn set_commission_rate(&self, rate: Decimal) -> Result<String> {
        if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
            return Err(StkPayError::validation(
                "Commission rate must be between 0 and 100",
            ));
        }
        let body = CommissionRate {
            commission_rate: rate,
        };
        let ack: MessageResponse = self.post_json("/admin/set-commission", &body).await?;
        Ok(ack.message)
    }

    /// Switch the session to a business account
    pub async fn impersonate(&self, business_id: u64) -> Result<()> {
        let token: TokenResponse = self
            .get_json(&format!("/admin/impersonate/{}", business_id))
            .await?;
        self.session.acquire(token.access_token)?;
        info!("Impersonating business {}", business_id);
        Ok(())
    }

    /// Download every tenant's customers as a spreadsheet
    pub async fn export_all_customers_excel(&self) -> Result<ExportFile> {
        self.download("/admin/customers/export-excel", ALL_CUSTOMERS_EXPORT_NAME)
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.authorized(self.client.get(self.config.endpoint(path)))?;
        let response = self.execute(request, true).await?;
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.authorized(self.client.post(self.config.endpoint(path)).json(body))?;
        let response = self.execute(request, true).await?;
        Ok(response.json().await?)
    }

    async fn download(&self, path: &str, fallback_name: &str) -> Result<ExportFile> {
        let request = self.authorized(self.client.get(self.config.endpoint(path)))?;
        let response = self.execute(request, true).await?;
        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_file_name)
            .unwrap_or_else(|| fallback_name.to_string());
        let bytes = response.bytes().await?.to_vec();
        Ok(ExportFile { file_name, bytes })
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let bearer = self.session.bearer()?;
        Ok(request.header(AUTHORIZATION, bearer))
    }

    /// Send a request and turn non-2xx responses into errors
    async fn execute(&self, request: RequestBuilder, authorized: bool) -> Result<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url().path());

        if status.is_success() {
            return Ok(response);
        }

        let message = error_message(response).await;
        match status {
            StatusCode::UNAUTHORIZED => {
                if authorized {
                    warn!("Session rejected by backend, clearing token");
                    if let Err(e) = self.session.clear() {
                        warn!("Failed to clear rejected session: {}", e);
                    }
                }
                Err(StkPayError::auth(message))
            }
            StatusCode::FORBIDDEN => Err(StkPayError::forbidden(message)),
            _ => Err(StkPayError::backend(status.as_u16(), message)),
        }
    }
}

fn transport_error(error: reqwest::Error) -> StkPayError {
    if error.is_timeout() {
        StkPayError::Timeout
    } else {
        StkPayError::Network(error)
    }
}

/// Message carried by an error body, or a generic one naming the status
async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    message_from_body(&body)
        .unwrap_or_else(|| format!("Request failed with status: {}", status.as_u16()))
}

fn message_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error"]
        .iter()
        .filter_map(|key| value.get(*key))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn attachment_file_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = DashboardClient::new(ClientConfig::new("https://api.example.com")).unwrap();
        assert_eq!(client.config().base_url, "https://api.example.com");
        assert!(!client.session().is_authenticated());
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        assert!(DashboardClient::new(ClientConfig::new("")).is_err());
    }

    #[test]
    fn test_message_from_body() {
        assert_eq!(
            message_from_body(r#"{"message":"Invalid phone"}"#),
            Some("Invalid phone".to_string())
        );
        assert_eq!(
            message_from_body(r#"{"msg":"Token has expired"}"#),
            Some("Token has expired".to_string())
        );
        assert_eq!(message_from_body("<html>oops</html>"), None);
        assert_eq!(message_from_body(r#"{"message":""}"#), None);
    }

    #[test]
    fn test_attachment_file_name() {
        assert_eq!(
            attachment_file_name(r#"attachment; filename="customers.xlsx""#),
            Some("customers.xlsx".to_string())
        );
        assert_eq!(attachment_file_name("attachment"), None);
    }

    #[tokio::test]
    async fn test_authorized_call_without_session_fails_fast() {
        let client = DashboardClient::new(ClientConfig::new("http://127.0.0.1:9")).unwrap();
        let err = tokio_test::assert_err!(client.customers().await);
        assert!(err.is_auth());
        let request = PaymentRequest::parse("254712345678", "1").unwrap();
        tokio_test::assert_err!(client.stk_push(&request).await);
    }
}
