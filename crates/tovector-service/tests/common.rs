//! Common test utilities for tovector integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::io::Cursor;
use std::sync::Arc;

use axum::Router;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use wiremock::MockServer;

use tovector_core::{ImageId, UploadPolicy, UserId};
use tovector_service::auth::JwtClaims;
use tovector_service::crypto::hmac_sha256_hex;
use tovector_service::{create_router, AppState, MemoryObjectStore, ServiceConfig};
use tovector_store::{MemoryStore, Store};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Upload limits small enough to exercise in tests.
pub const TEST_MAX_BYTES: usize = 1024 * 1024;
pub const TEST_MAX_PIXELS: u64 = 10_000;
pub const TEST_UPLOAD_RATE_LIMIT: u32 = 3;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Ledger and image rows.
    pub store: Arc<MemoryStore>,
    /// Stored objects.
    pub objects: Arc<MemoryObjectStore>,
    /// Stand-in for the vectorization API.
    pub vectorizer: MockServer,
    /// Stand-in for the Stripe API.
    pub stripe: MockServer,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a harness with every integration configured.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a harness, letting the caller adjust the configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let vectorizer = MockServer::start().await;
        let stripe = MockServer::start().await;

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            jwt_secret: JWT_SECRET.into(),
            stripe_secret_key: Some("sk_test_123".into()),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
            stripe_api_url: format!("{}/v1", stripe.uri()),
            vectorizer_api_key: Some("vk_test".into()),
            vectorizer_api_url: vectorizer.uri(),
            frontend_url: "http://localhost:5173".into(),
            max_body_bytes: 4 * 1024 * 1024,
            request_timeout_seconds: 30,
            upload_policy: UploadPolicy {
                max_bytes: TEST_MAX_BYTES,
                max_pixels: TEST_MAX_PIXELS,
            },
            upload_rate_limit: TEST_UPLOAD_RATE_LIMIT,
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjectStore::new());

        let state = AppState::new(store.clone(), objects.clone(), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            objects,
            vectorizer,
            stripe,
            test_user_id: UserId::generate(),
        }
    }

    /// Get the authorization header for the test user.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer {}", mint_token(&self.test_user_id.to_string()))
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        format!("Bearer {}", mint_token(&UserId::generate().to_string()))
    }

    /// Give the test user `amount` paid credits.
    pub async fn grant_credits(&self, amount: i64) {
        self.store
            .add_credits(
                &self.test_user_id,
                amount,
                tovector_core::ActionType::Purchase,
                "Test grant",
                None,
            )
            .await
            .expect("Failed to grant credits");
    }

    /// Use up the test user's free preview.
    pub async fn spend_free_preview(&self) {
        self.store
            .ensure_credits(&self.test_user_id)
            .await
            .expect("Failed to create account");
        self.store
            .deduct_credits(
                &self.test_user_id,
                1,
                tovector_core::ActionType::Preview,
                "Test preview",
            )
            .await
            .expect("Failed to spend free preview");
    }

    /// Upload a PNG as the test user and return the new image id.
    pub async fn upload_png(&self, width: u32, height: u32) -> ImageId {
        let response = self
            .server
            .post("/api/upload")
            .add_header("authorization", self.user_auth_header())
            .multipart(image_form(
                png_bytes(width, height),
                "photo.png",
                "image/png",
            ))
            .await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        body["data"]["id"]
            .as_str()
            .expect("upload response carries an id")
            .parse()
            .expect("valid image id")
    }
}

/// Mint an HS256 access token the service accepts.
pub fn mint_token(sub: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        sub: sub.to_string(),
        aud: Some(serde_json::Value::String("authenticated".into())),
        exp: now + 3600,
        iat: Some(now),
        email: Some("user@example.com".into()),
        role: Some("authenticated".into()),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign token")
}

/// Encode a solid-colour PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    out.into_inner()
}

/// Encode a solid-colour JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 40, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg)
        .expect("Failed to encode JPEG");
    out.into_inner()
}

/// Multipart form with a single `file` field.
pub fn image_form(bytes: Vec<u8>, file_name: &str, mime: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(bytes).file_name(file_name).mime_type(mime),
    )
}

/// Build a `Stripe-Signature` header for `payload`, signed now.
pub fn stripe_signature(payload: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    stripe_signature_at(payload, timestamp)
}

/// Build a `Stripe-Signature` header for `payload` with an explicit timestamp.
pub fn stripe_signature_at(payload: &str, timestamp: i64) -> String {
    let signature = hmac_sha256_hex(WEBHOOK_SECRET, &format!("{timestamp}.{payload}"))
        .expect("HMAC accepts any key length");
    format!("t={timestamp},v1={signature}")
}

/// A completed, paid Checkout session object as Stripe sends it.
pub fn paid_session(session_id: &str, user_id: &UserId, credits: i64) -> serde_json::Value {
    serde_json::json!({
        "id": session_id,
        "object": "checkout.session",
        "url": null,
        "payment_status": "paid",
        "status": "complete",
        "amount_total": credits * 100,
        "currency": "usd",
        "client_reference_id": user_id.to_string(),
        "metadata": {
            "user_id": user_id.to_string(),
            "credits": credits.to_string()
        }
    })
}
