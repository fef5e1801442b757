//! Image listing and deletion.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;

use tovector_core::ImageId;

use super::{DataResponse, ImageResponse, PageQuery};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Image page.
#[derive(Debug, Serialize)]
pub struct ImagesResponse {
    /// Images, newest first.
    pub images: Vec<ImageResponse>,
    /// Whether there are more images.
    pub has_more: bool,
}

/// List the caller's images.
pub async fn list_images(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ImagesResponse>, ApiError> {
    let limit = query.clamped_limit();

    let mut images = state
        .store
        .list_images(&auth.user_id, limit + 1, query.offset)
        .await?;

    let has_more = images.len() > limit;
    images.truncate(limit);

    let images = images
        .iter()
        .map(|image| ImageResponse::new(image, state.objects.public_url(&image.path)))
        .collect();

    Ok(Json(ImagesResponse { images, has_more }))
}

/// Deletion result.
#[derive(Debug, Serialize)]
pub struct DeletedImage {
    /// ID of the deleted image.
    pub id: String,
    /// Always true.
    pub deleted: bool,
}

/// Delete one of the caller's images and its stored object.
///
/// Derived rows go with it (the store cascades). Object removal is
/// best-effort: the row is the source of truth.
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<DeletedImage>>, ApiError> {
    let image_id: ImageId = id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid image ID".into()))?;

    let image = state
        .store
        .get_image(&image_id)
        .await?
        .filter(|image| image.is_owned_by(&auth.user_id))
        .ok_or_else(|| ApiError::NotFound("Image not found".into()))?;

    state.store.delete_image(&image_id).await?;

    if let Err(e) = state.objects.remove(&image.path).await {
        tracing::warn!(error = %e, path = %image.path, "Failed to remove stored object");
    }

    tracing::info!(user_id = %auth.user_id, image_id = %image_id, "Image deleted");

    Ok(Json(DataResponse::new(
        "Image deleted successfully",
        DeletedImage {
            id: image_id.to_string(),
            deleted: true,
        },
    )))
}
