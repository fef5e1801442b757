//! Application state.

use std::sync::Arc;
use std::time::Duration;

use tovector_store::Store;

use crate::auth::JwtVerifier;
use crate::config::ServiceConfig;
use crate::ratelimit::RateLimiter;
use crate::storage::ObjectStore;
use crate::stripe::StripeClient;
use crate::telemetry::Metrics;
use crate::vectorizer::VectorizerClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The database backend.
    pub store: Arc<dyn Store>,

    /// Object storage for image files.
    pub objects: Arc<dyn ObjectStore>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Access-token verifier.
    pub jwt: JwtVerifier,

    /// Stripe client for payments (optional).
    pub stripe: Option<Arc<StripeClient>>,

    /// Vectorizer client (optional).
    pub vectorizer: Option<Arc<VectorizerClient>>,

    /// Per-user upload limiter.
    pub upload_limiter: Arc<RateLimiter>,

    /// Request counters.
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, objects: Arc<dyn ObjectStore>, config: ServiceConfig) -> Self {
        let jwt = JwtVerifier::new(&config.jwt_secret, &config.auth_audience);

        // Create Stripe client if configured
        let stripe = config.stripe_secret_key.as_ref().and_then(|key| {
            match StripeClient::new(key, &config.stripe_api_url) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - payments will not be available");
        }

        // Create vectorizer client if configured
        let vectorizer = config.vectorizer_api_key.as_ref().and_then(|key| {
            match VectorizerClient::new(&config.vectorizer_api_url, key) {
                Ok(client) => {
                    tracing::info!(url = %config.vectorizer_api_url, "Vectorizer integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create vectorizer client");
                    None
                }
            }
        });

        if vectorizer.is_none() {
            tracing::warn!("Vectorizer not configured - preview and vectorize will fail");
        }

        let upload_limiter = Arc::new(build_upload_limiter(&config));

        Self {
            store,
            objects,
            config,
            jwt,
            stripe,
            vectorizer,
            upload_limiter,
            metrics: Arc::new(Metrics::new()),
        }
    }
}

fn build_upload_limiter(config: &ServiceConfig) -> RateLimiter {
    let window = Duration::from_secs(config.upload_rate_window_seconds);
    let limit = config.upload_rate_limit;

    if let Some(url) = &config.redis_url {
        match RateLimiter::redis("upload", limit, window, url) {
            Ok(limiter) => {
                tracing::info!("Upload rate limits shared through Redis");
                return limiter;
            }
            Err(e) => {
                tracing::error!(error = %e, "Invalid REDIS_URL, using in-memory rate limits");
            }
        }
    }

    RateLimiter::in_memory("upload", limit, window)
}
