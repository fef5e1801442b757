//! Vectorizer API client implementation.

use reqwest::Client;
use std::time::Duration;

use super::types::{VectorizeMode, VectorizeRequest, VectorizeResponse, VectorizerErrorResponse};

/// Error type for vectorizer operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorizerError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("vectorizer API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The API answered 2xx without usable SVG.
    #[error("vectorizer returned no SVG content")]
    EmptyResult,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Vectorizer API client.
#[derive(Debug, Clone)]
pub struct VectorizerClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl VectorizerClient {
    /// Create a new vectorizer client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, VectorizerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| VectorizerError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Vectorize the raster at `image_url`.
    ///
    /// No retries: any failure is returned to the caller.
    pub async fn vectorize(
        &self,
        image_url: &str,
        mode: VectorizeMode,
        options: serde_json::Map<String, serde_json::Value>,
    ) -> Result<VectorizeResponse, VectorizerError> {
        let request = VectorizeRequest::new(image_url, mode, options);

        tracing::debug!(image_url = %image_url, ?mode, "Calling vectorizer");

        let response = self
            .client
            .post(format!("{}/v1/vectorize", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<VectorizerErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("HTTP {status}"),
            };
            return Err(VectorizerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: VectorizeResponse = response.json().await?;
        if body.svg_content.trim().is_empty() {
            return Err(VectorizerError::EmptyResult);
        }
        Ok(body)
    }
}
