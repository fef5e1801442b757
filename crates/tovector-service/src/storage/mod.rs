//! Object storage for uploaded rasters and generated SVGs.
//!
//! Production uses Supabase Storage; tests use [`MemoryObjectStore`].

pub mod memory;
pub mod supabase;

pub use memory::MemoryObjectStore;
pub use supabase::SupabaseStorage;

use async_trait::async_trait;

/// Error type for object storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The storage API rejected the request.
    #[error("storage API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or message.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// A bucket of objects addressed by path.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path`. Existing objects are not overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be written.
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    /// Remove the object at `path`. Removing a missing object succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    async fn remove(&self, path: &str) -> Result<(), StorageError>;

    /// Publicly readable URL of `path`.
    fn public_url(&self, path: &str) -> String;
}
