//! Payment processor integration via REST API (no SDK dependency)
//!
//! Three calls: create checkout preference, fetch payment by id, search
//! payments by `external_reference`. Every call carries an explicit timeout;
//! no store lock is ever held while one of these is in flight.

mod checkout;
mod credentials;

pub use checkout::{CheckoutSession, create_checkout};
pub use credentials::{CheckoutCredential, CredentialSource, select_credential};

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Marker the processor puts in its 400 response when one party of a split
/// payment is a sandbox account and the other is not.
const SANDBOX_COUNTERPART_MARKER: &str = "must be real or test users";

/// Payment processor errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Processor request failed: {0}")]
    Network(String),

    #[error("Processor returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Processor rejected split payment, sandbox/production account mismatch: {0}")]
    SandboxCounterpart(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Network(e.to_string())
    }
}

/// A created checkout preference
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutPreference {
    pub id: String,
    pub init_point: String,
    #[serde(default)]
    pub sandbox_init_point: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeDetail {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionDetails {
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub net_received_amount: Option<Decimal>,
}

/// A payment as reported by the processor — the authoritative record
/// reconciliation aligns orders against.
#[derive(Debug, Clone, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub transaction_amount: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub marketplace_fee: Option<Decimal>,
    #[serde(default)]
    pub fee_details: Vec<FeeDetail>,
    #[serde(default)]
    pub transaction_details: Option<TransactionDetails>,
}

impl Payment {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    results: Vec<Payment>,
}

/// Processor REST client. Constructed once and injected, never a
/// module-level singleton.
#[derive(Debug, Clone)]
pub struct ProcessorClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProcessorClient {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, BoxError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a checkout preference
    pub async fn create_preference(
        &self,
        access_token: &str,
        body: &serde_json::Value,
    ) -> Result<CheckoutPreference, GatewayError> {
        let resp = self
            .http
            .post(format!("{}/checkout/preferences", self.base_url))
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Fetch a payment by its processor id. `None` when the processor does
    /// not know the id (it may be one of our preference pseudo-ids).
    pub async fn get_payment(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<Option<Payment>, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/v1/payments/{payment_id}", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp).await?;
        Ok(Some(resp.json().await?))
    }

    /// Search payments by `external_reference`
    pub async fn search_payments(
        &self,
        access_token: &str,
        external_reference: &str,
    ) -> Result<Vec<Payment>, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/v1/payments/search", self.base_url))
            .bearer_auth(access_token)
            .query(&[("external_reference", external_reference)])
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let found: SearchResults = resp.json().await?;
        Ok(found.results)
    }
}

/// Map a non-2xx response to a GatewayError, recognizing the sandbox
/// counterpart rejection as its own case.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if body.contains(SANDBOX_COUNTERPART_MARKER) {
        return Err(GatewayError::SandboxCounterpart(body));
    }
    Err(GatewayError::Http {
        status: status.as_u16(),
        body,
    })
}
