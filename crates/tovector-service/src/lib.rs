//! tovector HTTP API Service.
//!
//! This crate provides the HTTP API behind the tovector web app:
//!
//! - Raster image upload with validation and pixel-budget resizing
//! - Preview and full vectorization through a third-party API
//! - Credit balance, credit log and image history queries
//! - Stripe Checkout purchases, confirmation and webhooks
//!
//! # Authentication
//!
//! User requests carry a Supabase Auth access token
//! (`Authorization: Bearer <jwt>`), verified locally with the project's
//! HS256 JWT secret. Stripe webhooks are authenticated by signature.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for the router signature

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod imaging;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod storage;
pub mod stripe;
pub mod telemetry;
pub mod vectorizer;

pub use config::{ConfigError, ServiceConfig};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use storage::{MemoryObjectStore, ObjectStore, StorageError, SupabaseStorage};
pub use stripe::{StripeClient, StripeError};
pub use vectorizer::{VectorizerClient, VectorizerError};
