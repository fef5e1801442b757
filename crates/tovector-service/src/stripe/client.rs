//! Stripe API client implementation.

use reqwest::Client;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::types::{CheckoutParams, CheckoutSession, StripeErrorResponse};
use crate::crypto::{constant_time_eq, hmac_sha256_hex};

/// Maximum age of a webhook signature timestamp.
pub const WEBHOOK_TOLERANCE_SECONDS: i64 = 300;

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Invalid webhook signature.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Signature timestamp outside the tolerance window.
    #[error("Webhook timestamp outside tolerance")]
    SignatureExpired,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Not a Checkout session id.
    #[error("Invalid checkout session id: {0}")]
    InvalidSessionId(String),
}

/// Whether `id` has the shape of a Checkout session id (`cs_` followed by
/// letters, digits and underscores). Only such ids are placed in a URL path.
#[must_use]
pub fn is_checkout_session_id(id: &str) -> bool {
    id.strip_prefix("cs_").is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `base_url` - API root, normally `https://api.stripe.com/v1`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, StripeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StripeError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a Checkout session selling `params.credits` credits.
    ///
    /// One line item priced per credit with `quantity = credits`; the user
    /// id goes into `client_reference_id` and both ids into metadata so the
    /// webhook can credit the right account.
    pub async fn create_checkout_session(
        &self,
        params: &CheckoutParams<'_>,
    ) -> Result<CheckoutSession, StripeError> {
        let mut form = vec![
            ("mode", "payment".to_string()),
            ("success_url", params.success_url.to_string()),
            ("cancel_url", params.cancel_url.to_string()),
            ("client_reference_id", params.user_id.to_string()),
            ("line_items[0][price_data][currency]", params.currency.to_string()),
            (
                "line_items[0][price_data][product_data][name]",
                "tovector credits".to_string(),
            ),
            (
                "line_items[0][price_data][product_data][description]",
                format!("{} vectorization credits", params.credits),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                params.unit_amount.to_string(),
            ),
            ("line_items[0][quantity]", params.credits.to_string()),
            ("metadata[user_id]", params.user_id.to_string()),
            ("metadata[credits]", params.credits.to_string()),
        ];
        if let Some(email) = params.customer_email {
            form.push(("customer_email", email.to_string()));
        }

        tracing::debug!(
            user_id = %params.user_id,
            credits = params.credits,
            unit_amount = params.unit_amount,
            currency = %params.currency,
            "Creating Stripe checkout session"
        );

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Retrieve a Checkout session by ID.
    pub async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        if !is_checkout_session_id(session_id) {
            return Err(StripeError::InvalidSessionId(session_id.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", self.base_url, session_id))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

/// Verify a `Stripe-Signature` header against the raw payload.
///
/// The header has the form `t=timestamp,v1=signature[,v1=...]`. The
/// signature is HMAC-SHA256 of `"{t}.{payload}"` keyed by the endpoint
/// secret. Timestamps further than [`WEBHOOK_TOLERANCE_SECONDS`] from now
/// are rejected.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &str,
    signature: &str,
) -> Result<(), StripeError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
    verify_webhook_signature_at(secret, payload, signature, now)
}

/// [`verify_webhook_signature`] against an explicit clock.
pub fn verify_webhook_signature_at(
    secret: &str,
    payload: &str,
    signature: &str,
    now: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(ts)) => timestamp = Some(ts),
            (Some("v1"), Some(sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature)?;
    let seconds: i64 = timestamp
        .parse()
        .map_err(|_| StripeError::InvalidSignature)?;

    if signatures.is_empty() {
        return Err(StripeError::InvalidSignature);
    }

    let signed_payload = format!("{timestamp}.{payload}");
    let expected = hmac_sha256_hex(secret, &signed_payload)
        .ok_or_else(|| StripeError::Configuration("unusable webhook secret".into()))?;

    if !signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        return Err(StripeError::InvalidSignature);
    }

    if (now - seconds).abs() > WEBHOOK_TOLERANCE_SECONDS {
        return Err(StripeError::SignatureExpired);
    }

    Ok(())
}
