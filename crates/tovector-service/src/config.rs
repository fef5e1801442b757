//! Service configuration.

use serde::Deserialize;
use std::path::Path;
use tovector_core::{PricingConfig, UploadPolicy};

use crate::telemetry::LogFormat;

/// Default upload budget per user and window.
const DEFAULT_UPLOAD_RATE_LIMIT: u32 = 10;

/// Default rate-limit window (15 minutes).
const DEFAULT_UPLOAD_RATE_WINDOW_SECONDS: u64 = 15 * 60;

/// Default request body limit: 36 MiB, so a 35 MB upload plus multipart
/// framing fits.
const DEFAULT_MAX_BODY_BYTES: usize = 36 * 1024 * 1024;

/// Configuration errors raised at start-up.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:3001").
    pub listen_addr: String,

    /// PostgreSQL connection string.
    pub database_url: String,

    /// Maximum pooled database connections (default: 10).
    pub database_max_connections: u32,

    /// Supabase project URL.
    pub supabase_url: String,

    /// Supabase service-role key, used for Storage writes.
    pub supabase_service_key: String,

    /// Supabase JWT secret for verifying access tokens.
    pub jwt_secret: String,

    /// Expected JWT audience (default: "authenticated").
    pub auth_audience: String,

    /// Storage bucket for images (default: "images").
    pub storage_bucket: String,

    /// Stripe secret key (optional; payments disabled without it).
    pub stripe_secret_key: Option<String>,

    /// Stripe webhook signing secret (optional).
    pub stripe_webhook_secret: Option<String>,

    /// Stripe API base URL.
    pub stripe_api_url: String,

    /// Vectorizer API key (optional; preview and vectorize disabled without it).
    pub vectorizer_api_key: Option<String>,

    /// Vectorizer API base URL.
    pub vectorizer_api_url: String,

    /// Redis URL for shared rate-limit counters (optional).
    pub redis_url: Option<String>,

    /// Frontend URL for checkout redirects.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Log output format.
    pub log_format: LogFormat,

    /// Pricing configuration.
    pub pricing: PricingConfig,

    /// Upload size and pixel limits.
    pub upload_policy: UploadPolicy,

    /// Uploads allowed per user per window.
    pub upload_rate_limit: u32,

    /// Upload rate-limit window in seconds.
    pub upload_rate_window_seconds: u64,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a numeric
    /// variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok())?;

        if let Some(secrets) = load_stripe_secrets() {
            config.stripe_secret_key = Some(secrets.api_key);
            if secrets.webhook_secret.is_some() {
                config.stripe_webhook_secret = secrets.webhook_secret;
            }
        }

        Ok(config)
    }

    /// Build a configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let or_default = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        let defaults = Self::default();

        Ok(Self {
            listen_addr: or_default("LISTEN_ADDR", &defaults.listen_addr),
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            supabase_url: required("SUPABASE_URL")?.trim_end_matches('/').to_string(),
            supabase_service_key: required("SUPABASE_SERVICE_KEY")?,
            jwt_secret: required("SUPABASE_JWT_SECRET")?,
            auth_audience: or_default("AUTH_AUDIENCE", &defaults.auth_audience),
            storage_bucket: or_default("STORAGE_BUCKET", &defaults.storage_bucket),
            stripe_secret_key: lookup("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: lookup("STRIPE_WEBHOOK_SECRET"),
            stripe_api_url: or_default("STRIPE_API_URL", &defaults.stripe_api_url),
            vectorizer_api_key: lookup("VECTORIZER_API_KEY"),
            vectorizer_api_url: or_default("VECTORIZER_API_URL", &defaults.vectorizer_api_url),
            redis_url: lookup("REDIS_URL"),
            frontend_url: or_default("FRONTEND_URL", &defaults.frontend_url)
                .trim_end_matches('/')
                .to_string(),
            cors_origins: or_default("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes)?,
            request_timeout_seconds: parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            )?,
            log_format: match lookup("LOG_FORMAT") {
                Some(value) => value.parse().map_err(|()| ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value,
                })?,
                None => LogFormat::Pretty,
            },
            pricing: PricingConfig::default(),
            upload_policy: UploadPolicy::default(),
            upload_rate_limit: parse_or(&lookup, "UPLOAD_RATE_LIMIT", defaults.upload_rate_limit)?,
            upload_rate_window_seconds: parse_or(
                &lookup,
                "UPLOAD_RATE_WINDOW_SECONDS",
                defaults.upload_rate_window_seconds,
            )?,
        })
    }

    /// Public base URL of the Supabase Storage API.
    #[must_use]
    pub fn storage_api_url(&self) -> String {
        format!("{}/storage/v1", self.supabase_url)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Load Stripe secrets from file, if one exists.
fn load_stripe_secrets() -> Option<StripeSecrets> {
    let secret_paths = [".secrets/stripe.json", "../.secrets/stripe.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return Some(secrets);
        }
    }

    tracing::debug!("Stripe secrets file not found, using environment variables");
    None
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".into(),
            database_url: "postgres://localhost/tovector".into(),
            database_max_connections: 10,
            supabase_url: "http://localhost:54321".into(),
            supabase_service_key: String::new(),
            jwt_secret: String::new(),
            auth_audience: "authenticated".into(),
            storage_bucket: "images".into(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_api_url: "https://api.stripe.com/v1".into(),
            vectorizer_api_key: None,
            vectorizer_api_url: "https://api.vectorizer.ai".into(),
            redis_url: None,
            frontend_url: "http://localhost:5173".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout_seconds: 60,
            log_format: LogFormat::Pretty,
            pricing: PricingConfig::default(),
            upload_policy: UploadPolicy::default(),
            upload_rate_limit: DEFAULT_UPLOAD_RATE_LIMIT,
            upload_rate_window_seconds: DEFAULT_UPLOAD_RATE_WINDOW_SECONDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("DATABASE_URL", "postgres://db/tovector"),
        ("SUPABASE_URL", "https://proj.supabase.co/"),
        ("SUPABASE_SERVICE_KEY", "service-key"),
        ("SUPABASE_JWT_SECRET", "jwt-secret"),
    ];

    #[test]
    fn required_only_uses_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:3001");
        assert_eq!(config.supabase_url, "https://proj.supabase.co");
        assert_eq!(config.storage_api_url(), "https://proj.supabase.co/storage/v1");
        assert_eq!(config.auth_audience, "authenticated");
        assert_eq!(config.storage_bucket, "images");
        assert_eq!(config.frontend_url, "http://localhost:5173");
        assert_eq!(config.max_body_bytes, 36 * 1024 * 1024);
        assert_eq!(config.request_timeout_seconds, 60);
        assert_eq!(config.upload_rate_limit, 10);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.stripe_secret_key.is_none());
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn missing_required_variable_is_reported() {
        let err = ServiceConfig::from_lookup(lookup(&REQUIRED[..3])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SUPABASE_JWT_SECRET")));
    }

    #[test]
    fn invalid_number_is_reported() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("REQUEST_TIMEOUT_SECONDS", "soon"));
        let err = ServiceConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "REQUEST_TIMEOUT_SECONDS", .. }
        ));
    }

    #[test]
    fn overrides_are_applied() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("CORS_ORIGINS", "https://tovector.ai, https://www.tovector.ai"),
            ("LOG_FORMAT", "json"),
            ("STRIPE_SECRET_KEY", "sk_test_123"),
            ("REDIS_URL", "redis://cache:6379"),
        ]);
        let config = ServiceConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(
            config.cors_origins,
            vec!["https://tovector.ai", "https://www.tovector.ai"]
        );
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.stripe_secret_key.as_deref(), Some("sk_test_123"));
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
    }
}
