//! Image upload handler.

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use tovector_core::{storage_path, ImageId, ImageRecord};

use super::{DataResponse, ImageResponse};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::imaging::{prepare_upload, ImagingError};
use crate::ratelimit::RateDecision;
use crate::state::AppState;

/// Multipart field carrying the image.
const FILE_FIELD: &str = "file";

struct UploadedFile {
    name: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// Upload a PNG or JPEG.
///
/// Validation happens before anything is written: content type, byte size,
/// then a full decode. Images above the pixel budget are scaled down and
/// re-encoded in their original format.
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<Json<DataResponse<ImageResponse>>, ApiError> {
    if let RateDecision::Limited {
        retry_after_seconds,
    } = state.upload_limiter.check(&auth.user_id.to_string()).await
    {
        tracing::info!(user_id = %auth.user_id, retry_after_seconds, "Upload rate limit hit");
        return Err(ApiError::RateLimited {
            retry_after_seconds,
        });
    }

    let policy = state.config.upload_policy;
    let file = read_file_field(multipart, policy.max_megabytes()).await?;

    let kind = policy.check_mime(&file.content_type)?;
    policy.check_size(file.bytes.len())?;

    let original_size = file.bytes.len();
    let prepared = prepare_upload(file.bytes, kind, policy)
        .await
        .map_err(|e| match e {
            ImagingError::Decode(msg) => {
                tracing::debug!(user_id = %auth.user_id, error = %msg, "Upload failed to decode");
                ApiError::BadRequest("Invalid image data".into())
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    let image_id = ImageId::generate();
    let path = storage_path(&auth.user_id, &image_id, kind.extension());
    let stored_size = prepared.bytes.len();

    if let Err(e) = state
        .objects
        .put(&path, prepared.bytes, kind.mime_type())
        .await
    {
        tracing::error!(error = %e, path = %path, "Error uploading image");
        return Err(ApiError::Failed("Failed to upload image".into()));
    }

    let now = Utc::now();
    let record = ImageRecord {
        id: image_id,
        user_id: auth.user_id,
        path: path.clone(),
        original_name: file.name,
        mime_type: kind.mime_type().to_string(),
        size: i64::try_from(stored_size).unwrap_or(i64::MAX),
        width: prepared.width,
        height: prepared.height,
        was_resized: prepared.was_resized,
        parent_id: None,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.store.insert_image(&record).await {
        tracing::error!(error = %e, path = %path, "Error creating image record");
        if let Err(cleanup) = state.objects.remove(&path).await {
            tracing::warn!(error = %cleanup, path = %path, "Failed to remove orphaned upload");
        }
        return Err(ApiError::Failed("Failed to save image metadata".into()));
    }

    tracing::info!(
        user_id = %auth.user_id,
        image_id = %image_id,
        original_size,
        stored_size,
        width = record.width,
        height = record.height,
        was_resized = record.was_resized,
        "Image uploaded"
    );

    let message = if record.was_resized {
        "Image uploaded successfully (resized)"
    } else {
        "Image uploaded successfully"
    };
    let url = state.objects.public_url(&record.path);
    Ok(Json(DataResponse::new(message, ImageResponse::new(&record, url))))
}

/// Pull the `file` field out of the form, skipping any other fields.
async fn read_file_field(
    mut multipart: Multipart,
    max_megabytes: usize,
) -> Result<UploadedFile, ApiError> {
    let too_large =
        || ApiError::BadRequest(format!("File too large. Maximum size is {max_megabytes}MB."));

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(ApiError::BadRequest("No file provided".into())),
            Err(e) if exceeds_body_limit(&e) => return Err(too_large()),
            Err(e) => return Err(ApiError::BadRequest(e.body_text())),
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = field.bytes().await.map_err(|e| {
            if exceeds_body_limit(&e) {
                too_large()
            } else {
                ApiError::BadRequest(e.body_text())
            }
        })?;

        return Ok(UploadedFile {
            name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
}

/// Whether a multipart read stopped at the request body limit.
///
/// A limit applied below the extractor surfaces as a read failure rather
/// than a 413, so the error chain is searched as well.
fn exceeds_body_limit(err: &MultipartError) -> bool {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if inner.to_string().contains("length limit exceeded") {
            return true;
        }
        source = inner.source();
    }
    false
}
