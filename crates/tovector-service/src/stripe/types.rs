//! Stripe API types.

use std::collections::HashMap;

use serde::Deserialize;

/// Stripe Checkout session object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session ID.
    pub id: String,
    /// Checkout URL to redirect the user to.
    #[serde(default)]
    pub url: Option<String>,
    /// Payment status (`paid`, `unpaid`, `no_payment_required`).
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Total amount in cents.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Currency.
    #[serde(default)]
    pub currency: Option<String>,
    /// Client reference ID (our `user_id`).
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Session status.
    #[serde(default)]
    pub status: Option<String>,
    /// Metadata. Stripe stores every value as a string.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// Whether Stripe reports the payment as collected.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    /// Purchasing user, from metadata with the client reference as fallback.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .get("user_id")
            .or_else(|| self.metadata.get("userId"))
            .map(String::as_str)
            .or(self.client_reference_id.as_deref())
    }

    /// Credits bought in this session.
    #[must_use]
    pub fn credits(&self) -> Option<i64> {
        self.metadata.get("credits").and_then(|v| v.parse().ok())
    }
}

/// Parameters for a credit purchase session.
#[derive(Debug, Clone)]
pub struct CheckoutParams<'a> {
    /// Purchasing user.
    pub user_id: &'a str,
    /// Prefills the email field on the hosted page.
    pub customer_email: Option<&'a str>,
    /// Credits bought; becomes the line item quantity.
    pub credits: i64,
    /// Price of one credit in the smallest currency unit.
    pub unit_amount: i64,
    /// ISO currency code.
    pub currency: &'a str,
    /// Redirect after payment.
    pub success_url: &'a str,
    /// Redirect on cancel.
    pub cancel_url: &'a str,
}

/// Stripe webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}
