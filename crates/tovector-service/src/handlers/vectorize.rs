//! Preview and vectorize handlers.
//!
//! Both follow the same sequence: look up the caller's raster, charge the
//! ledger, call the vectorizer with the raster's public URL, store the SVG
//! and its derived row. A failure after the charge refunds it.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use tovector_core::{
    storage_path, ActionType, Deduction, ImageId, ImageRecord, UserId, SVG_MIME_TYPE,
};

use super::{DataResponse, ImageResponse};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::vectorizer::VectorizeMode;

/// Preview / vectorize request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorizeRequest {
    /// Raster to vectorize.
    #[serde(default)]
    pub image_id: Option<String>,
    /// Vectorizer options, forwarded as-is.
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

/// Preview / vectorize response payload.
#[derive(Debug, Serialize)]
pub struct VectorizeResult {
    /// The derived SVG row.
    pub image: ImageResponse,
    /// Paid credits charged (zero when a free preview was used).
    pub credits_charged: i64,
    /// Whether a free preview was used.
    pub free_preview: bool,
    /// Paid balance after the charge.
    pub credit_balance: i64,
    /// Free previews left.
    pub free_previews: i32,
}

/// Generate a low-resolution preview. Costs one credit, or one free preview.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<VectorizeRequest>,
) -> Result<Json<DataResponse<VectorizeResult>>, ApiError> {
    let result = run(&state, &auth, body, ActionType::Preview).await?;
    Ok(Json(DataResponse::new("Preview generated successfully", result)))
}

/// Vectorize at full quality. Costs five credits.
pub async fn vectorize(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<VectorizeRequest>,
) -> Result<Json<DataResponse<VectorizeResult>>, ApiError> {
    let result = run(&state, &auth, body, ActionType::Vectorize).await?;
    Ok(Json(DataResponse::new("Image vectorized successfully", result)))
}

async fn run(
    state: &AppState,
    auth: &AuthUser,
    body: VectorizeRequest,
    action: ActionType,
) -> Result<VectorizeResult, ApiError> {
    let image_id = body
        .image_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Image ID is required".into()))?;
    let image_id: ImageId = image_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid image ID".into()))?;

    let options = match body.options {
        None | Some(serde_json::Value::Null) => serde_json::Map::new(),
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => return Err(ApiError::BadRequest("Options must be an object".into())),
    };

    let source = state
        .store
        .get_image(&image_id)
        .await?
        .filter(|image| image.is_owned_by(&auth.user_id))
        .ok_or_else(|| ApiError::NotFound("Image not found".into()))?;

    if source.is_vector() {
        return Err(ApiError::BadRequest("Image is already a vector".into()));
    }

    let vectorizer = state.vectorizer.as_ref().ok_or_else(|| {
        tracing::error!("Vectorizer API key not configured");
        ApiError::ExternalService("Vectorization service unavailable".into())
    })?;

    state.store.ensure_credits(&auth.user_id).await?;

    let cost = state.config.pricing.cost_of(action);
    let description = match action {
        ActionType::Preview => "Preview generation",
        _ => "Vectorization",
    };
    let deduction = state
        .store
        .deduct_credits(&auth.user_id, cost, action, description)
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        image_id = %image_id,
        action = %action,
        credits = deduction.charge.credits(),
        free_preview = deduction.charge.is_free_preview(),
        balance = deduction.balance_after(),
        "Credits charged"
    );

    let mode = match action {
        ActionType::Preview => VectorizeMode::Preview,
        _ => VectorizeMode::Production,
    };
    let source_url = state.objects.public_url(&source.path);

    let svg = match vectorizer.vectorize(&source_url, mode, options).await {
        Ok(response) => response.svg_content,
        Err(e) => {
            tracing::error!(error = %e, image_id = %image_id, "Vectorizer call failed");
            refund(state, &deduction, action).await;
            return Err(ApiError::ExternalService("Vectorization failed".into()));
        }
    };

    let derived = match store_svg(state, &auth.user_id, &source, svg).await {
        Ok(derived) => derived,
        Err(e) => {
            refund(state, &deduction, action).await;
            return Err(e);
        }
    };

    tracing::info!(
        user_id = %auth.user_id,
        image_id = %image_id,
        derived_id = %derived.id,
        action = %action,
        "Vectorization stored"
    );

    let url = state.objects.public_url(&derived.path);
    Ok(VectorizeResult {
        image: ImageResponse::new(&derived, url),
        credits_charged: deduction.charge.credits(),
        free_preview: deduction.charge.is_free_preview(),
        credit_balance: deduction.balance_after(),
        free_previews: deduction.account.free_previews,
    })
}

/// Write the SVG object and its derived row.
async fn store_svg(
    state: &AppState,
    user_id: &UserId,
    source: &ImageRecord,
    svg: String,
) -> Result<ImageRecord, ApiError> {
    let derived_id = ImageId::generate();
    let path = storage_path(user_id, &derived_id, "svg");
    let size = i64::try_from(svg.len()).unwrap_or(i64::MAX);

    if let Err(e) = state.objects.put(&path, svg.into_bytes(), SVG_MIME_TYPE).await {
        tracing::error!(error = %e, path = %path, "Failed to upload vectorized image");
        return Err(ApiError::Failed("Failed to upload vectorized image".into()));
    }

    let now = Utc::now();
    let derived = ImageRecord {
        id: derived_id,
        user_id: *user_id,
        path: path.clone(),
        original_name: format!("{}_vectorized.svg", source.original_name),
        mime_type: SVG_MIME_TYPE.to_string(),
        size,
        width: source.width,
        height: source.height,
        was_resized: false,
        parent_id: Some(source.id),
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.store.insert_image(&derived).await {
        tracing::error!(error = %e, path = %path, "Failed to save vectorized image record");
        if let Err(cleanup) = state.objects.remove(&path).await {
            tracing::warn!(error = %cleanup, path = %path, "Failed to remove orphaned SVG");
        }
        return Err(ApiError::Failed("Failed to save image metadata".into()));
    }

    Ok(derived)
}

/// Give back a charge whose work failed. A failed refund is logged; the
/// original error still reaches the caller.
async fn refund(state: &AppState, deduction: &Deduction, action: ActionType) {
    let description = format!("Refund: {action} failed");
    match state.store.refund(deduction, &description).await {
        Ok(log) => tracing::info!(
            user_id = %deduction.account.user_id,
            credits = log.credits_added,
            free_preview = log.free_preview,
            balance = log.balance_after,
            "Charge refunded"
        ),
        Err(e) => tracing::error!(
            error = %e,
            user_id = %deduction.account.user_id,
            credits = deduction.charge.credits(),
            "Refund failed"
        ),
    }
}
