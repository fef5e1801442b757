//! Stripe webhook handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use tovector_core::{ActionType, UserId};
use tovector_store::StoreError;

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{verify_webhook_signature, CheckoutSession, WebhookEvent};

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle Stripe webhooks.
///
/// The body is taken raw: the signature covers the exact bytes Stripe sent.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("No signature".into()))?;

    let secret = state.config.stripe_webhook_secret.as_deref().ok_or_else(|| {
        tracing::error!("Stripe webhook secret not configured");
        ApiError::Failed("Webhook secret not configured".into())
    })?;

    verify_webhook_signature(secret, &body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Invalid Stripe webhook signature");
        ApiError::BadRequest("Webhook error: invalid signature".into())
    })?;

    let event: WebhookEvent = serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed Stripe webhook payload");
        ApiError::BadRequest("Webhook error: malformed payload".into())
    })?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            handle_checkout_completed(&state, &event.data.object).await?;
        }
        "payment_intent.succeeded" => {
            let id = event.data.object.get("id").and_then(|v| v.as_str());
            tracing::info!(payment_intent = ?id, "Payment succeeded");
        }
        "payment_intent.payment_failed" => {
            let id = event.data.object.get("id").and_then(|v| v.as_str());
            let reason = event
                .data
                .object
                .pointer("/last_payment_error/message")
                .and_then(|v| v.as_str());
            tracing::warn!(payment_intent = ?id, reason = ?reason, "Payment failed");
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Unhandled Stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

async fn handle_checkout_completed(
    state: &AppState,
    object: &serde_json::Value,
) -> Result<(), ApiError> {
    let session: CheckoutSession = serde_json::from_value(object.clone())
        .map_err(|e| ApiError::BadRequest(format!("Invalid checkout session: {e}")))?;

    if !session.is_paid() {
        tracing::info!(
            session_id = %session.id,
            payment_status = ?session.payment_status,
            "Checkout completed without payment, skipping"
        );
        return Ok(());
    }

    // Malformed paid sessions are logged and acknowledged, never retried
    let Some(user_id) = session.user_id().and_then(|id| id.parse::<UserId>().ok()) else {
        tracing::error!(session_id = %session.id, "Paid checkout session has no valid user_id");
        return Ok(());
    };

    let Some(credits) = session.credits().filter(|&credits| credits > 0) else {
        tracing::error!(
            session_id = %session.id,
            user_id = %user_id,
            "Paid checkout session has no valid credits"
        );
        return Ok(());
    };

    match state
        .store
        .add_credits(
            &user_id,
            credits,
            ActionType::Purchase,
            "Credit purchase",
            Some(&session.id),
        )
        .await
    {
        Ok(log) => {
            tracing::info!(
                user_id = %user_id,
                session_id = %session.id,
                credits,
                balance = log.balance_after,
                "Credits added from checkout"
            );
            Ok(())
        }
        Err(StoreError::DuplicateEvent { .. }) => {
            tracing::info!(session_id = %session.id, "Checkout session already credited");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
