mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{ACCEPT, CONTENT_TYPE, ETAG};
use axum::http::{Method, Request, StatusCode};
use common::*;
use giftpanel_telegram::RemoteError;
use http_body_util::BodyExt;
use serde_json::json;

const OTHER_USER: i64 = 2;

// ---------------------------------------------------------------------------
// Test: endpoints require a bearer token
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gifts_require_authentication() {
    let app = build_test_app();

    let request = Request::builder()
        .uri("/api/v1/gifts")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn malformed_token_is_rejected() {
    let app = build_test_app();

    let request = Request::builder()
        .uri("/api/v1/gifts")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Test: snapshot reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn never_synced_user_gets_empty_list_without_etag() {
    let app = build_test_app();

    let response = get(&app.router, "/api/v1/gifts").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(ETAG).is_none());
    let json = body_json(response).await;
    assert_eq!(json["data"], json!([]));
}

#[tokio::test]
async fn refresh_returns_merged_gifts_and_updates_snapshot() {
    let app = build_test_app();

    let response = post_as(&app.router, "/api/v1/gifts/refresh", USER).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let items = json["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], "7");
    assert_eq!(items[0]["available_amount"], 3);

    let response = get(&app.router, "/api/v1/gifts").await;
    assert_eq!(response.status(), StatusCode::OK);
    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap();
    assert!(etag.starts_with('"') && etag.ends_with('"'));
    assert_eq!(etag.len(), 64 + 2);
    let json = body_json(response).await;
    assert_eq!(json["data"][0]["id"], "7");
}

#[tokio::test]
async fn unchanged_refresh_keeps_etag() {
    let app = build_test_app();

    post_as(&app.router, "/api/v1/gifts/refresh", USER).await;
    let first = get(&app.router, "/api/v1/gifts").await;
    let first_tag = first.headers().get(ETAG).cloned().unwrap();

    post_as(&app.router, "/api/v1/gifts/refresh", USER).await;
    let second = get(&app.router, "/api/v1/gifts").await;

    assert_eq!(second.headers().get(ETAG), Some(&first_tag));
    assert_eq!(app.gateway.gift_calls(), 2);
}

// ---------------------------------------------------------------------------
// Test: refresh failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_without_accounts_is_conflict() {
    let app = build_test_app();

    let response = post_as(&app.router, "/api/v1/gifts/refresh", OTHER_USER).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"], "no_accounts");
    assert_eq!(json["code"], "NO_ACCOUNTS");
}

#[tokio::test]
async fn refresh_with_every_account_failing_is_bad_gateway() {
    let app = build_test_app();
    app.gateway.respond_gifts(Err(RemoteError::TransientNetwork("timeout".into())));

    let response = post_as(&app.router, "/api/v1/gifts/refresh", USER).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "refresh_failed");
    assert!(json["detail"].as_str().unwrap().contains("account 10"));
}

#[tokio::test]
async fn revoked_session_unlinks_the_account() {
    let app = build_test_app();
    app.gateway.respond_gifts(Err(RemoteError::SessionInvalid {
        code: "AUTH_KEY_UNREGISTERED".into(),
    }));

    let response = post_as(&app.router, "/api/v1/gifts/refresh", USER).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(app.store.account_ids(USER).is_empty());

    let response = post_as(&app.router, "/api/v1/gifts/refresh", USER).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Test: streamed refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streamed_refresh_emits_progress_records() {
    let app = build_test_app();

    let response = post_as(&app.router, "/api/v1/gifts/refresh?stream=1", USER).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/x-ndjson"
    );
    let lines = body_lines(response).await;
    let stages: Vec<&str> = lines.iter().map(|l| l["stage"].as_str().unwrap()).collect();
    assert_eq!(stages, ["start", "fetched", "done"]);
    assert_eq!(lines[1]["count"], 1);
    assert_eq!(lines[2]["items"][0]["id"], "7");
}

#[tokio::test]
async fn accept_header_selects_streamed_refresh() {
    let app = build_test_app();

    let request = authed(Method::POST, "/api/v1/gifts/refresh", USER)
        .header(ACCEPT, "application/x-ndjson")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;

    let lines = body_lines(response).await;
    assert_eq!(lines.first().unwrap()["stage"], "start");
    assert_eq!(lines.last().unwrap()["stage"], "done");
}

#[tokio::test]
async fn streamed_refresh_reports_errors_in_band() {
    let app = build_test_app();

    let response = post_as(&app.router, "/api/v1/gifts/refresh?stream=true", OTHER_USER).await;

    assert_eq!(response.status(), StatusCode::OK);
    let lines = body_lines(response).await;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["stage"], "error");
    assert_eq!(lines[1]["error"], "no_accounts");
}

// ---------------------------------------------------------------------------
// Test: poll with wait
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_returns_immediately_when_hash_differs() {
    let app = build_test_app();
    post_as(&app.router, "/api/v1/gifts/refresh", USER).await;

    let response = get(&app.router, "/api/v1/gifts/poll?since=stale").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["state"], "ready");
    assert_eq!(json["data"]["items"][0]["id"], "7");
    assert_eq!(json["data"]["hash"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn poll_with_current_hash_times_out_as_refreshing() {
    let app = build_test_app();
    post_as(&app.router, "/api/v1/gifts/refresh", USER).await;
    let current = body_json(get(&app.router, "/api/v1/gifts/poll").await).await;
    let hash = current["data"]["hash"].as_str().unwrap().to_string();

    let response = get(&app.router, &format!("/api/v1/gifts/poll?since={hash}")).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["state"], "refreshing");
}

#[tokio::test]
async fn poll_wakes_on_published_change() {
    let app = build_test_app();
    post_as(&app.router, "/api/v1/gifts/refresh", USER).await;
    let current = body_json(get(&app.router, "/api/v1/gifts/poll").await).await;
    let hash = current["data"]["hash"].as_str().unwrap().to_string();

    let router = app.router.clone();
    let waiter = tokio::spawn(async move {
        get(&router, &format!("/api/v1/gifts/poll?since={hash}")).await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    app.gateway.respond_gifts(Ok(vec![observed_gift("7", 2)]));
    post_as(&app.router, "/api/v1/gifts/refresh", USER).await;

    let response = waiter.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["items"][0]["available_amount"], 2);
}

// ---------------------------------------------------------------------------
// Test: live stream
// ---------------------------------------------------------------------------

async fn next_text(body: &mut Body) -> String {
    loop {
        let frame = body.frame().await.unwrap().unwrap();
        if let Ok(data) = frame.into_data() {
            let text = String::from_utf8(data.to_vec()).unwrap();
            if !text.trim().is_empty() {
                return text;
            }
        }
    }
}

#[tokio::test]
async fn stream_sends_snapshot_then_changes() {
    let app = build_test_app();
    post_as(&app.router, "/api/v1/gifts/refresh", USER).await;

    let response = get(&app.router, "/api/v1/gifts/stream").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let mut body = response.into_body();

    let first = next_text(&mut body).await;
    assert!(first.contains("event: snapshot"));
    assert!(first.contains("\"count\":1"));

    app.gateway
        .respond_gifts(Ok(vec![observed_gift("7", 1), observed_gift("8", 5)]));
    post_as(&app.router, "/api/v1/gifts/refresh", USER).await;

    let second = tokio::time::timeout(Duration::from_secs(5), next_text(&mut body))
        .await
        .unwrap();
    assert!(second.contains("event: gifts"));
    assert!(second.contains("\"count\":2"));
}

// ---------------------------------------------------------------------------
// Test: settings and status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn settings_default_to_auto_refresh_off() {
    let app = build_test_app();

    let response = get(&app.router, "/api/v1/gifts/settings").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["auto_refresh"], false);
}

#[tokio::test]
async fn enabling_auto_refresh_is_persisted_and_reported() {
    let app = build_test_app();

    let response = put_json(
        &app.router,
        "/api/v1/gifts/settings",
        json!({ "auto_refresh": true }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["auto_refresh"], true);

    let json = body_json(get(&app.router, "/api/v1/gifts/settings").await).await;
    assert_eq!(json["data"]["auto_refresh"], true);

    let status = body_json(get(&app.router, "/api/v1/gifts/status").await).await;
    assert_eq!(status["data"]["auto_refresh"], true);
    assert_ne!(status["data"]["state"], "idle");

    let response = put_json(
        &app.router,
        "/api/v1/gifts/settings",
        json!({ "auto_refresh": false }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    app.state.sync.shutdown().await;
}

#[tokio::test]
async fn settings_reject_malformed_body() {
    let app = build_test_app();

    let response = put_json(
        &app.router,
        "/api/v1/gifts/settings",
        json!({ "auto_refresh": "sometimes" }),
    )
    .await;

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn status_reports_last_hash_after_refresh() {
    let app = build_test_app();

    let before = body_json(get(&app.router, "/api/v1/gifts/status").await).await;
    assert_eq!(before["data"]["state"], "idle");
    assert!(before["data"]["last_hash"].is_null());

    post_as(&app.router, "/api/v1/gifts/refresh", USER).await;

    let after = body_json(get(&app.router, "/api/v1/gifts/status").await).await;
    assert_eq!(after["data"]["last_hash"].as_str().unwrap().len(), 64);
    assert!(after["data"]["last_polled_at"].is_string());
}
