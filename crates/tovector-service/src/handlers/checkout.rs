//! Credit purchase handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use tovector_core::ActionType;
use tovector_store::StoreError;

use super::DataResponse;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{is_checkout_session_id, CheckoutParams, StripeClient};

/// Checkout request body.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Number of credits to buy. Kept loose so bad input is a 400.
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "usd".to_string()
}

/// Checkout response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// Stripe session ID.
    pub session_id: String,
    /// Hosted checkout URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Start a Stripe Checkout session for a credit purchase.
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<DataResponse<CheckoutResponse>>, ApiError> {
    let pricing = &state.config.pricing;

    let credits = body
        .amount
        .as_ref()
        .and_then(serde_json::Value::as_i64)
        .filter(|&credits| pricing.is_valid_purchase(credits))
        .ok_or_else(|| ApiError::BadRequest("Invalid amount".into()))?;

    let currency = body.currency.trim().to_lowercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApiError::BadRequest("Invalid currency".into()));
    }

    let stripe = stripe_client(&state)?;

    let frontend = state.config.frontend_url.trim_end_matches('/');
    let success_url = format!("{frontend}/confirmation?session_id={{CHECKOUT_SESSION_ID}}");
    let cancel_url = format!("{frontend}/pricing");
    let user_id = auth.user_id.to_string();

    let params = CheckoutParams {
        user_id: &user_id,
        customer_email: auth.email.as_deref(),
        credits,
        unit_amount: pricing.credit_unit_price_cents,
        currency: &currency,
        success_url: &success_url,
        cancel_url: &cancel_url,
    };

    let session = stripe.create_checkout_session(&params).await.map_err(|e| {
        tracing::error!(error = %e, user_id = %auth.user_id, "Failed to create checkout session");
        ApiError::ExternalService("Failed to create checkout session".into())
    })?;

    tracing::info!(
        user_id = %auth.user_id,
        session_id = %session.id,
        credits,
        total_cents = pricing.purchase_total_cents(credits),
        "Checkout session created"
    );

    Ok(Json(DataResponse::new(
        "Checkout session created",
        CheckoutResponse {
            session_id: session.id,
            url: session.url,
        },
    )))
}

/// Confirmation request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// Stripe session ID from the success redirect.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Confirmation response.
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    /// Credits bought in the session.
    pub credits: i64,
    /// Paid balance after crediting.
    pub credit_balance: i64,
    /// Whether the session had already been credited (by the webhook).
    pub already_credited: bool,
}

/// Credit a completed Checkout session to the caller.
///
/// The session id is the ledger reference, so a session is credited once
/// whether confirmation or the webhook gets there first.
pub async fn confirm_checkout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ConfirmRequest>,
) -> Result<Json<DataResponse<ConfirmResponse>>, ApiError> {
    let session_id = body
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Session ID is required".into()))?;

    if !is_checkout_session_id(session_id) {
        tracing::warn!(user_id = %auth.user_id, "Rejected malformed checkout session id");
        return Err(ApiError::BadRequest("Invalid session ID".into()));
    }

    let stripe = stripe_client(&state)?;

    let session = stripe.get_checkout_session(session_id).await.map_err(|e| {
        tracing::error!(error = %e, session_id = %session_id, "Failed to retrieve checkout session");
        ApiError::ExternalService("Failed to retrieve checkout session".into())
    })?;

    if !session.is_paid() {
        return Err(ApiError::BadRequest("Payment not completed".into()));
    }

    let user_id = auth.user_id.to_string();
    if session.user_id() != Some(user_id.as_str()) {
        tracing::warn!(
            user_id = %auth.user_id,
            session_id = %session.id,
            "Checkout session belongs to another user"
        );
        return Err(ApiError::Forbidden);
    }

    let credits = session
        .credits()
        .ok_or_else(|| ApiError::BadRequest("Invalid checkout session".into()))?;

    let result = state
        .store
        .add_credits(
            &auth.user_id,
            credits,
            ActionType::Purchase,
            "Credit purchase",
            Some(&session.id),
        )
        .await;

    let (credit_balance, already_credited) = match result {
        Ok(log) => {
            tracing::info!(
                user_id = %auth.user_id,
                session_id = %session.id,
                credits,
                balance = log.balance_after,
                "Credits purchased"
            );
            (log.balance_after, false)
        }
        Err(StoreError::DuplicateEvent { .. }) => {
            tracing::info!(session_id = %session.id, "Checkout session already credited");
            let account = state.store.ensure_credits(&auth.user_id).await?;
            (account.credit_balance, true)
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(DataResponse::new(
        "Credits added successfully",
        ConfirmResponse {
            credits,
            credit_balance,
            already_credited,
        },
    )))
}

fn stripe_client(state: &AppState) -> Result<&StripeClient, ApiError> {
    state.stripe.as_deref().ok_or_else(|| {
        tracing::error!("Stripe API key not configured");
        ApiError::Failed("Payments are not configured".into())
    })
}
