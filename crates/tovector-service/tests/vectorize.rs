//! Preview and vectorize integration tests.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::TestHarness;
use tovector_core::ActionType;
use tovector_store::Store;

const SVG: &str = "<svg xmlns=\"http://www.w3.org/2000/svg\"><rect/></svg>";

async fn mock_vectorizer_ok(harness: &TestHarness, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/vectorize"))
        .and(header("authorization", "Bearer vk_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "svg_content": SVG })))
        .expect(expected_calls)
        .mount(&harness.vectorizer)
        .await;
}

#[tokio::test]
async fn preview_uses_free_preview_first() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(20, 20).await;
    mock_vectorizer_ok(&harness, 1).await;

    let response = harness
        .server
        .post("/api/preview")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string() }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Preview generated successfully");
    assert_eq!(body["data"]["free_preview"], true);
    assert_eq!(body["data"]["credits_charged"], 0);
    assert_eq!(body["data"]["credit_balance"], 0);
    assert_eq!(body["data"]["free_previews"], 0);

    let account = harness
        .store
        .get_credits(&harness.test_user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.free_previews, 0);
    assert_eq!(account.credit_balance, 0);
}

#[tokio::test]
async fn preview_sends_preview_mode_and_options() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(20, 20).await;

    Mock::given(method("POST"))
        .and(path("/v1/vectorize"))
        .and(body_partial_json(json!({ "mode": "preview", "colors": 8 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "svg_content": SVG })))
        .expect(1)
        .mount(&harness.vectorizer)
        .await;

    harness
        .server
        .post("/api/preview")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string(), "options": { "colors": 8 } }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn preview_charges_a_credit_once_free_previews_are_gone() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(20, 20).await;
    harness.spend_free_preview().await;
    harness.grant_credits(3).await;
    mock_vectorizer_ok(&harness, 1).await;

    let response = harness
        .server
        .post("/api/preview")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string() }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["free_preview"], false);
    assert_eq!(body["data"]["credits_charged"], 1);
    assert_eq!(body["data"]["credit_balance"], 2);
}

#[tokio::test]
async fn vectorize_charges_five_credits_and_stores_svg() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(30, 20).await;
    harness.grant_credits(10).await;
    mock_vectorizer_ok(&harness, 1).await;

    let response = harness
        .server
        .post("/api/vectorize")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string() }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Image vectorized successfully");

    let data = &body["data"];
    assert_eq!(data["credits_charged"], 5);
    assert_eq!(data["credit_balance"], 5);
    // A full vectorization never consumes the free preview
    assert_eq!(data["free_preview"], false);
    assert_eq!(data["free_previews"], 1);

    let image = &data["image"];
    assert_eq!(image["mime_type"], "image/svg+xml");
    assert_eq!(image["parent_id"], image_id.to_string());
    assert_eq!(image["original_name"], "photo.png_vectorized.svg");
    assert_eq!(image["width"], 30);
    assert_eq!(image["height"], 20);

    let stored = harness
        .objects
        .get(image["path"].as_str().unwrap())
        .await
        .expect("SVG stored");
    assert_eq!(stored.bytes, SVG.as_bytes());
    assert_eq!(stored.content_type, "image/svg+xml");
    assert_eq!(harness.store.image_count().await, 2);
}

#[tokio::test]
async fn vectorize_without_enough_credits_is_402_and_skips_the_api() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(20, 20).await;
    harness.grant_credits(3).await;
    mock_vectorizer_ok(&harness, 0).await;

    let response = harness
        .server
        .post("/api/vectorize")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string() }))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_credits");
    assert_eq!(body["error"]["details"]["balance"], 3);
    assert_eq!(body["error"]["details"]["required"], 5);

    let account = harness
        .store
        .get_credits(&harness.test_user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.credit_balance, 3);
}

#[tokio::test]
async fn vectorizer_failure_refunds_the_charge() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(20, 20).await;
    harness.grant_credits(10).await;

    Mock::given(method("POST"))
        .and(path("/v1/vectorize"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "error": { "message": "boom" } })),
        )
        .expect(1)
        .mount(&harness.vectorizer)
        .await;

    let response = harness
        .server
        .post("/api/vectorize")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string() }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["message"], "Vectorization failed");

    let account = harness
        .store
        .get_credits(&harness.test_user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.credit_balance, 10);

    let logs = harness
        .store
        .list_credit_logs(&harness.test_user_id, 10, 0)
        .await
        .unwrap();
    assert_eq!(logs[0].action_type, ActionType::Refund);
    assert_eq!(logs[0].credits_added, 5);
    assert_eq!(logs[1].action_type, ActionType::Vectorize);
    assert_eq!(logs[1].credits_used, 5);

    // Only the source raster remains
    assert_eq!(harness.store.image_count().await, 1);
}

#[tokio::test]
async fn failed_free_preview_gives_the_preview_back() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(20, 20).await;

    Mock::given(method("POST"))
        .and(path("/v1/vectorize"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&harness.vectorizer)
        .await;

    harness
        .server
        .post("/api/preview")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string() }))
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    let account = harness
        .store
        .get_credits(&harness.test_user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.free_previews, 1);
    assert_eq!(account.credit_balance, 0);
}

#[tokio::test]
async fn storage_failure_after_vectorizing_refunds_the_charge() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(20, 20).await;
    harness.grant_credits(5).await;
    mock_vectorizer_ok(&harness, 1).await;
    harness.objects.fail_writes(true);

    let response = harness
        .server
        .post("/api/vectorize")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string() }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let account = harness
        .store
        .get_credits(&harness.test_user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.credit_balance, 5);
}

#[tokio::test]
async fn missing_image_id_is_400() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/api/preview")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["message"], "Image ID is required");
}

#[tokio::test]
async fn malformed_image_id_is_400() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/api/vectorize")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": "not-a-uuid" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn another_users_image_is_not_found() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(20, 20).await;
    mock_vectorizer_ok(&harness, 0).await;

    let response = harness
        .server
        .post("/api/preview")
        .add_header("authorization", TestHarness::other_user_auth_header())
        .json(&json!({ "imageId": image_id.to_string() }))
        .await;

    response.assert_status_not_found();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["message"], "Image not found");
}

#[tokio::test]
async fn derived_svg_cannot_be_vectorized_again() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(20, 20).await;
    harness.grant_credits(10).await;
    mock_vectorizer_ok(&harness, 1).await;

    let response = harness
        .server
        .post("/api/vectorize")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string() }))
        .await;
    let body: serde_json::Value = response.json();
    let svg_id = body["data"]["image"]["id"].as_str().unwrap().to_string();

    let response = harness
        .server
        .post("/api/vectorize")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": svg_id }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let account = harness
        .store
        .get_credits(&harness.test_user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.credit_balance, 5);
}

#[tokio::test]
async fn options_must_be_an_object() {
    let harness = TestHarness::new().await;
    let image_id = harness.upload_png(20, 20).await;

    let response = harness
        .server
        .post("/api/preview")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string(), "options": [1, 2] }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unconfigured_vectorizer_is_500_without_charging() {
    let harness = TestHarness::with_config(|config| config.vectorizer_api_key = None).await;
    let image_id = harness.upload_png(20, 20).await;

    let response = harness
        .server
        .post("/api/preview")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "imageId": image_id.to_string() }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(harness.store.log_count().await, 0);
}
