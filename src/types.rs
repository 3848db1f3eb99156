//! Core types for the STK-push dashboard API

use crate::{Result, StkPayError};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of digits in an E.164 number
pub const MAX_PHONE_DIGITS: usize = 15;

/// Timestamp format used by the backend for every date field
pub const BACKEND_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A payment request to push to a payer's phone.
///
/// Both fields are validated on construction and cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    /// Payer's phone number, digits only
    #[serde(rename = "phone_number")]
    recipient_phone: String,
    /// Amount to request, strictly positive
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
}

impl PaymentRequest {
    /// Create a validated payment request
    pub fn new(recipient_phone: impl AsRef<str>, amount: Decimal) -> Result<Self> {
        let recipient_phone = normalize_phone(recipient_phone.as_ref())?;
        if amount <= Decimal::ZERO {
            return Err(StkPayError::validation("Amount must be greater than zero"));
        }
        Ok(Self {
            recipient_phone,
            amount,
        })
    }

    /// Create a payment request from raw form input
    pub fn parse(recipient_phone: impl AsRef<str>, amount: &str) -> Result<Self> {
        let amount = amount.trim();
        if amount.is_empty() {
            return Err(StkPayError::validation("Amount is required"));
        }
        let amount = Decimal::from_str(amount)
            .map_err(|_| StkPayError::validation(format!("Amount is not a number: {}", amount)))?;
        Self::new(recipient_phone, amount)
    }

    /// The normalized recipient phone number
    pub fn recipient_phone(&self) -> &str {
        &self.recipient_phone
    }

    /// The requested amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

fn normalize_phone(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(StkPayError::validation("Phone number is required"));
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(StkPayError::validation(format!(
            "Phone number must contain only digits: {}",
            raw
        )));
    }
    if digits.len() > MAX_PHONE_DIGITS {
        return Err(StkPayError::validation(format!(
            "Phone number has more than {} digits",
            MAX_PHONE_DIGITS
        )));
    }
    Ok(digits.to_string())
}

/// Opaque checkout identifier issued by the backend for an initiated push
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckoutId(String);

impl CheckoutId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckoutId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CheckoutId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Handle to an in-flight payment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequestHandle {
    pub checkout_id: CheckoutId,
}

impl PaymentRequestHandle {
    pub fn new(checkout_id: impl Into<CheckoutId>) -> Self {
        Self {
            checkout_id: checkout_id.into(),
        }
    }
}

/// Lifecycle status of a payment request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Initiated,
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    /// Whether no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Initiated => 0,
            Self::Pending => 1,
            Self::Success | Self::Failed => 2,
        }
    }

    /// Whether moving to `next` keeps the lifecycle monotonic
    pub fn can_advance_to(&self, next: PaymentStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials sent to the login endpoints
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Business registration payload
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Token issued by the login endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// Generic `{ "message": ... }` acknowledgement
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// Response to an STK push initiation
#[derive(Debug, Clone, Deserialize)]
pub struct StkPushResponse {
    pub checkout_request_id: CheckoutId,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of the transaction status endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionStatusResponse {
    pub status: PaymentStatus,
}

/// Response of the health endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Role attached to the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Business,
    Admin,
    #[serde(other)]
    Unknown,
}

/// Profile of the authenticated account
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Profile {
    /// Name to greet the account with
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("unknown")
    }
}

/// A payer who has completed at least one push for the current business
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub name: Option<String>,
    pub phone_number: String,
    pub total_amount_requested: Decimal,
    pub transaction_count: u32,
    #[serde(default, with = "backend_time::option")]
    pub first_transaction_date: Option<NaiveDateTime>,
    #[serde(default, with = "backend_time::option")]
    pub last_transaction_date: Option<NaiveDateTime>,
}

impl Customer {
    /// Dashboard search semantics: case-insensitive name match, or phone substring
    pub fn matches(&self, term: &str) -> bool {
        let name_match = self
            .name
            .as_deref()
            .map(|name| name.to_lowercase().contains(&term.to_lowercase()))
            .unwrap_or(false);
        name_match || self.phone_number.contains(term)
    }
}

/// Filter customers by a search term
pub fn filter_customers<'a>(customers: &'a [Customer], term: &str) -> Vec<&'a Customer> {
    customers.iter().filter(|c| c.matches(term)).collect()
}

/// Wallet balance and commissions charged to it
#[derive(Debug, Clone, Deserialize)]
pub struct WalletInfo {
    pub balance: Decimal,
    #[serde(default)]
    pub commission_ledgers: Vec<LedgerEntry>,
}

/// Single commission deduction
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerEntry {
    pub amount: Decimal,
    #[serde(with = "backend_time")]
    pub timestamp: NaiveDateTime,
}

/// Daraja credentials and shortcode of a business
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub consumer_key: String,
    pub consumer_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub till_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paybill_number: Option<String>,
}

impl Settings {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            till_number: None,
            paybill_number: None,
        }
    }

    pub fn with_till_number(mut self, till: impl Into<String>) -> Self {
        self.till_number = Some(till.into());
        self
    }

    pub fn with_paybill_number(mut self, paybill: impl Into<String>) -> Self {
        self.paybill_number = Some(paybill.into());
        self
    }

    /// Check the fields the update endpoint requires
    pub fn validate(&self) -> Result<()> {
        if self.consumer_key.trim().is_empty() || self.consumer_secret.trim().is_empty() {
            return Err(StkPayError::validation("Missing consumer key or secret"));
        }
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !present(&self.till_number) && !present(&self.paybill_number) {
            return Err(StkPayError::validation(
                "Missing till number or paybill number",
            ));
        }
        Ok(())
    }
}

/// Tenant record as listed to admins
#[derive(Debug, Clone, Deserialize)]
pub struct Business {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    #[serde(with = "backend_time")]
    pub created_at: NaiveDateTime,
    pub is_active: bool,
}

/// Transaction record as listed to admins
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub amount: Decimal,
    pub phone_number: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub checkout_request_id: Option<CheckoutId>,
    #[serde(with = "backend_time")]
    pub timestamp: NaiveDateTime,
    pub business_id: u64,
    #[serde(default)]
    pub customer_id: Option<u64>,
}

/// Commission ledger entry as listed to admins
#[derive(Debug, Clone, Deserialize)]
pub struct CommissionEntry {
    pub id: u64,
    pub amount: Decimal,
    #[serde(with = "backend_time")]
    pub timestamp: NaiveDateTime,
    pub business_id: u64,
}

/// Body of the set-commission admin call
#[derive(Debug, Clone, Serialize)]
pub struct CommissionRate {
    #[serde(with = "rust_decimal::serde::float")]
    pub commission_rate: Decimal,
}

/// Downloaded spreadsheet export
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Serde adapters for the backend's `%Y-%m-%d %H:%M:%S` timestamps
pub mod backend_time {
    use super::BACKEND_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(BACKEND_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, BACKEND_TIME_FORMAT).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::BACKEND_TIME_FORMAT;
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_str(&v.format(BACKEND_TIME_FORMAT).to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| {
                    NaiveDateTime::parse_from_str(&raw, BACKEND_TIME_FORMAT)
                        .map_err(serde::de::Error::custom)
                })
                .transpose()
        }
    }
}
