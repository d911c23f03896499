mod common;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use common::*;
use giftpanel_telegram::RemoteError;

// ---------------------------------------------------------------------------
// Test: staged account refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_streams_stages_then_done() {
    let app = build_test_app();

    let response = post_as(&app.router, "/api/v1/accounts/10/refresh", USER).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/x-ndjson"
    );
    let lines = body_lines(response).await;
    let stages: Vec<&str> = lines
        .iter()
        .filter_map(|l| l["stage"].as_str())
        .collect();
    // Non-premium accounts still report the premium stage.
    assert_eq!(stages, ["connect", "profile", "stars", "premium", "save"]);
    assert_eq!(lines[0]["message"], "Connecting…");

    let done = lines.last().unwrap();
    assert_eq!(done["done"], true);
    assert_eq!(done["message"], "Done");
    assert_eq!(done["account"]["id"], 10);
    assert_eq!(done["account"]["username"], "collector");
    assert_eq!(done["account"]["stars"], 250);
}

#[tokio::test]
async fn unknown_account_reports_not_found() {
    let app = build_test_app();

    let response = post_as(&app.router, "/api/v1/accounts/99/refresh", USER).await;

    assert_eq!(response.status(), StatusCode::OK);
    let lines = body_lines(response).await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["error"], "account_not_found");
}

#[tokio::test]
async fn other_users_account_is_not_visible() {
    let app = build_test_app();

    let response = post_as(&app.router, "/api/v1/accounts/10/refresh", 2).await;

    let lines = body_lines(response).await;
    assert_eq!(lines.last().unwrap()["error"], "account_not_found");
    assert_eq!(app.store.account_ids(USER), vec![10]);
}

#[tokio::test]
async fn invalid_session_removes_account() {
    let app = build_test_app();
    app.gateway.respond_profile(Err(RemoteError::SessionInvalid {
        code: "SESSION_REVOKED".into(),
    }));

    let response = post_as(&app.router, "/api/v1/accounts/10/refresh", USER).await;

    let lines = body_lines(response).await;
    let last = lines.last().unwrap();
    assert_eq!(last["error"], "session_invalid");
    assert_eq!(last["error_code"], "SESSION_REVOKED");
    assert!(app.store.account_ids(USER).is_empty());
}

#[tokio::test]
async fn rate_limited_refresh_keeps_account() {
    let app = build_test_app();
    app.gateway.respond_profile(Err(RemoteError::RateLimited { retry_after: None }));

    let response = post_as(&app.router, "/api/v1/accounts/10/refresh", USER).await;

    let lines = body_lines(response).await;
    let last = lines.last().unwrap();
    assert_eq!(last["error"], "refresh_failed");
    assert_eq!(last["error_code"], "FLOOD_WAIT");
    assert_eq!(app.store.account_ids(USER), vec![10]);
}

#[tokio::test]
async fn account_refresh_requires_authentication() {
    let app = build_test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/accounts/10/refresh")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
