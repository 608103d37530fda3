//! Payment-intent gateway and its Stripe implementation.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::error::AppError;

/// Stripe status of an intent whose charge has been captured.
pub const PAYMENT_STATUS_SUCCEEDED: &str = "succeeded";

/// Longest metadata value the provider stores.
pub const STRIPE_METADATA_VALUE_LIMIT: usize = 500;
/// Most metadata keys the provider stores on one object.
pub const STRIPE_METADATA_MAX_KEYS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment provider rejected the request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("payment intent {0} not found")]
    NotFound(String),
    #[error("payment intent metadata rejected: {0}")]
    InvalidMetadata(String),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound(_) => AppError::BadRequest("Unknown payment intent".into()),
            PaymentError::InvalidMetadata(message) => AppError::BadRequest(message),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status == PAYMENT_STATUS_SUCCEEDED
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentIntent {
    pub amount: i64,
    pub currency: String,
    pub metadata: BTreeMap<String, String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: &NewPaymentIntent,
    ) -> Result<PaymentIntent, PaymentError>;

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError>;
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    message: Option<String>,
}

pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(api_base: &str, secret_key: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("storefront-backend/1.0")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to initialize HTTP client: {}", e))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn parse_response(
        response: reqwest::Response,
        intent_id: Option<&str>,
    ) -> Result<PaymentIntent, PaymentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<PaymentIntent>().await?);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(id) = intent_id {
                return Err(PaymentError::NotFound(id.to_string()));
            }
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.error.message)
            .unwrap_or(body);
        Err(PaymentError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Form fields of `POST /v1/payment_intents`.
///
/// Metadata the provider would truncate or refuse is an error, never skipped.
fn intent_form_params(request: &NewPaymentIntent) -> Result<Vec<(String, String)>, PaymentError> {
    if request.metadata.len() > STRIPE_METADATA_MAX_KEYS {
        return Err(PaymentError::InvalidMetadata(format!(
            "at most {} metadata keys are allowed",
            STRIPE_METADATA_MAX_KEYS
        )));
    }
    if let Some((key, _)) = request
        .metadata
        .iter()
        .find(|(_, value)| value.len() > STRIPE_METADATA_VALUE_LIMIT)
    {
        return Err(PaymentError::InvalidMetadata(format!(
            "metadata value for {} exceeds {} characters",
            key, STRIPE_METADATA_VALUE_LIMIT
        )));
    }

    let mut params = vec![
        ("amount".to_string(), request.amount.to_string()),
        ("currency".to_string(), request.currency.clone()),
        (
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string(),
        ),
    ];
    params.extend(
        request
            .metadata
            .iter()
            .map(|(key, value)| (format!("metadata[{}]", key), value.clone())),
    );
    Ok(params)
}

fn is_valid_intent_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_payment_intent(
        &self,
        request: &NewPaymentIntent,
    ) -> Result<PaymentIntent, PaymentError> {
        let params = intent_form_params(request)?;
        let span = tracing::debug_span!("stripe_create_payment_intent", amount = request.amount);

        async {
            let response = self
                .http
                .post(format!("{}/v1/payment_intents", self.api_base))
                .bearer_auth(&self.secret_key)
                .form(&params)
                .send()
                .await?;
            Self::parse_response(response, None).await
        }
        .instrument(span)
        .await
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
        if !is_valid_intent_id(id) {
            return Err(PaymentError::NotFound(id.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{}", self.api_base, id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::parse_response(response, Some(id)).await
    }
}
