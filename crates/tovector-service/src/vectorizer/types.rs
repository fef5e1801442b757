//! Vectorizer API types.

use serde::{Deserialize, Serialize};

/// Output quality requested from the vectorizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorizeMode {
    /// Watermark-free low-resolution preview.
    Preview,
    /// Full-quality vectorization.
    Production,
}

/// Request body for `POST /v1/vectorize`.
#[derive(Debug, Clone, Serialize)]
pub struct VectorizeRequest {
    /// Publicly readable URL of the raster.
    pub image_url: String,
    /// Set only for previews.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<VectorizeMode>,
    /// Caller-supplied tuning options, passed through untouched.
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl VectorizeRequest {
    /// Build a request. Reserved keys in `options` are overridden.
    #[must_use]
    pub fn new(
        image_url: impl Into<String>,
        mode: VectorizeMode,
        mut options: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        options.remove("image_url");
        options.remove("mode");
        Self {
            image_url: image_url.into(),
            mode: (mode == VectorizeMode::Preview).then_some(mode),
            options,
        }
    }
}

/// Successful vectorizer response.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorizeResponse {
    /// Generated SVG markup.
    pub svg_content: String,
}

/// Vectorizer API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorizerErrorResponse {
    /// Error details.
    pub error: VectorizerErrorDetail,
}

/// Vectorizer error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorizerErrorDetail {
    /// Error message.
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}
