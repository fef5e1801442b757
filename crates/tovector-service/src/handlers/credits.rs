//! Credit balance and log handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use tovector_core::CreditLog;

use super::PageQuery;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    /// Paid credits.
    pub credit_balance: i64,
    /// Free previews left.
    pub free_previews: i32,
}

/// Get the caller's balance. The account is created on first access.
pub async fn get_credits(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CreditsResponse>, ApiError> {
    let account = state.store.ensure_credits(&auth.user_id).await?;

    Ok(Json(CreditsResponse {
        credit_balance: account.credit_balance,
        free_previews: account.free_previews,
    }))
}

/// Credit log entry response.
#[derive(Debug, Serialize)]
pub struct CreditLogResponse {
    /// Entry ID.
    pub id: String,
    /// What the entry records.
    pub action_type: String,
    /// Credits taken.
    pub credits_used: i64,
    /// Credits given.
    pub credits_added: i64,
    /// Whether a free preview was used (or returned).
    pub free_preview: bool,
    /// Balance after this entry.
    pub balance_after: i64,
    /// Description.
    pub description: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&CreditLog> for CreditLogResponse {
    fn from(log: &CreditLog) -> Self {
        Self {
            id: log.id.to_string(),
            action_type: log.action_type.to_string(),
            credits_used: log.credits_used,
            credits_added: log.credits_added,
            free_preview: log.free_preview,
            balance_after: log.balance_after,
            description: log.description.clone(),
            created_at: log.created_at.to_rfc3339(),
        }
    }
}

/// Credit log page.
#[derive(Debug, Serialize)]
pub struct CreditLogsResponse {
    /// Entries, newest first.
    pub logs: Vec<CreditLogResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List the caller's credit log.
pub async fn list_credit_logs(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<CreditLogsResponse>, ApiError> {
    let limit = query.clamped_limit();

    // Fetch one extra row to detect a following page
    let mut logs = state
        .store
        .list_credit_logs(&auth.user_id, limit + 1, query.offset)
        .await?;

    let has_more = logs.len() > limit;
    logs.truncate(limit);

    Ok(Json(CreditLogsResponse {
        logs: logs.iter().map(CreditLogResponse::from).collect(),
        has_more,
    }))
}
