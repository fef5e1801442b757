//! Vectorization API integration.
//!
//! The vectorizer fetches the raster from a public URL and returns SVG
//! markup. Preview requests produce a low-resolution result.

pub mod client;
pub mod types;

pub use client::{VectorizerClient, VectorizerError};
pub use types::{VectorizeMode, VectorizeRequest, VectorizeResponse};
