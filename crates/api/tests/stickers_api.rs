mod common;

use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{Method, StatusCode};
use common::*;

const STICKER_URI: &str = "/api/v1/gifts/sticker.lottie?file_id=file-7&uniq=uniq_7";

fn with_bot_token(app: &TestApp) {
    app.store.set_bot_token(USER, Some("123456:bot-token"));
}

// ---------------------------------------------------------------------------
// Test: successful download and caching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn serves_decoded_lottie_with_immutable_caching() {
    let app = build_test_app();
    with_bot_token(&app);

    let response = get(&app.router, STICKER_URI).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(
        response.headers().get(CACHE_CONTROL).unwrap(),
        "public, max-age=31536000, immutable"
    );
    assert!(response.headers().get(ETAG).is_some());
    assert_eq!(body_bytes(response).await, LOTTIE);
}

#[tokio::test]
async fn repeated_requests_hit_the_cache() {
    let app = build_test_app();
    with_bot_token(&app);

    let first = get(&app.router, STICKER_URI).await;
    let second = get(&app.router, STICKER_URI).await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(first.headers().get(ETAG), second.headers().get(ETAG));
    assert_eq!(app.downloader.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn matching_if_none_match_returns_not_modified() {
    let app = build_test_app();
    with_bot_token(&app);

    let first = get(&app.router, STICKER_URI).await;
    let etag = first.headers().get(ETAG).cloned().unwrap();

    let request = authed(Method::GET, STICKER_URI, USER)
        .header(IF_NONE_MATCH, etag.clone())
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers().get(ETAG), Some(&etag));
    assert!(body_bytes(response).await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_bot_token_is_conflict() {
    let app = build_test_app();

    let response = get(&app.router, STICKER_URI).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"], "no_bot_token");
    assert_eq!(app.downloader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_identifiers_are_rejected() {
    let app = build_test_app();
    with_bot_token(&app);

    let response = get(&app.router, "/api/v1/gifts/sticker.lottie").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn path_characters_in_key_are_rejected() {
    let app = build_test_app();
    with_bot_token(&app);

    let response = get(
        &app.router,
        "/api/v1/gifts/sticker.lottie?file_id=file-7&uniq=..%2Fetc",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.downloader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn plain_json_file_is_unsupported_media() {
    let app = build_test_app();
    with_bot_token(&app);
    *app.downloader.body.lock().unwrap() = Some(LOTTIE.to_vec());

    let response = get(&app.router, STICKER_URI).await;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body_json(response).await["error"], "bad_tgs");
}

#[tokio::test]
async fn bot_api_failure_is_bad_gateway() {
    let app = build_test_app();
    with_bot_token(&app);
    *app.downloader.body.lock().unwrap() = None;

    let response = get(&app.router, STICKER_URI).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "download_failed");
    assert!(json["detail"].as_str().unwrap().contains("502"));
}
