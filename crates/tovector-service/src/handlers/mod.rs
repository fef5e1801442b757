//! API handlers.

pub mod checkout;
pub mod credits;
pub mod health;
pub mod images;
pub mod upload;
pub mod vectorize;
pub mod webhooks;

use serde::{Deserialize, Serialize};

use tovector_core::ImageRecord;

/// Success envelope: `{ "message": ..., "data": ... }`.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    /// Human-readable outcome.
    pub message: String,
    /// Payload.
    pub data: T,
}

impl<T> DataResponse<T> {
    /// Wrap `data` with `message`.
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum number of items to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl PageQuery {
    /// Limit clamped to `1..=100`.
    #[must_use]
    pub fn clamped_limit(&self) -> usize {
        self.limit.clamp(1, 100)
    }
}

/// Image row as returned to clients.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    /// Image ID.
    pub id: String,
    /// Storage path.
    pub path: String,
    /// Public URL of the stored object.
    pub url: String,
    /// Original file name.
    pub original_name: String,
    /// MIME type.
    pub mime_type: String,
    /// Stored size in bytes.
    pub size: i64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Whether the upload was scaled down.
    pub was_resized: bool,
    /// Source raster for derived SVG rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl ImageResponse {
    /// Build the response for `image` with its public `url`.
    #[must_use]
    pub fn new(image: &ImageRecord, url: String) -> Self {
        Self {
            id: image.id.to_string(),
            path: image.path.clone(),
            url,
            original_name: image.original_name.clone(),
            mime_type: image.mime_type.clone(),
            size: image.size,
            width: image.width,
            height: image.height,
            was_resized: image.was_resized,
            parent_id: image.parent_id.map(|id| id.to_string()),
            created_at: image.created_at.to_rfc3339(),
        }
    }
}
