//! Handlers for the `/gifts` resource.
//!
//! All endpoints require authentication via [`AuthUser`] and operate on the
//! caller's own merged gift snapshot.

use std::future;

use axum::extract::{Query, State};
use axum::http::header::{ACCEPT, ETAG};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{stream, Stream, StreamExt};
use giftpanel_core::gift::Gift;
use giftpanel_events::bus::GIFTS_EVENT;
use giftpanel_sync::{SyncError, SyncStatus, WaitOutcome};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::{ndjson_response, DataResponse, NDJSON_CONTENT_TYPE};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query / response types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /gifts/poll`.
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Hash the client already has.
    pub since: Option<String>,
}

/// Body of a poll response.
#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PollResponse {
    Ready { hash: String, items: Vec<Gift> },
    Refreshing,
}

/// Query parameters for `POST /gifts/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    /// `1`/`true` requests NDJSON progress.
    pub stream: Option<String>,
}

/// One NDJSON record of a streamed manual refresh.
#[derive(Debug, Serialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum RefreshProgress {
    Start,
    Fetched {
        count: usize,
    },
    Done {
        items: Vec<Gift>,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl RefreshProgress {
    fn failed(err: &SyncError) -> Self {
        let error = match err {
            SyncError::NoAccounts => "no_accounts",
            _ => "refresh_failed",
        };
        Self::Error {
            error: error.to_string(),
            detail: Some(err.to_string()),
        }
    }
}

/// First event of a live stream: the stored snapshot at connect time.
#[derive(Debug, Serialize)]
struct SnapshotEvent {
    #[serde(rename = "type")]
    event_type: &'static str,
    payload: Vec<Gift>,
    count: usize,
    hash: Option<String>,
}

/// Body of `GET/PUT /gifts/settings`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GiftSettings {
    pub auto_refresh: bool,
}

fn etag_header(hash: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("\"{hash}\"")).ok()
}

// ---------------------------------------------------------------------------
// Snapshot reads
// ---------------------------------------------------------------------------

/// GET /api/v1/gifts
///
/// The stored snapshot. Carries the snapshot hash as `ETag`.
pub async fn list_gifts(auth: AuthUser, State(state): State<AppState>) -> AppResult<Response> {
    let snapshot = state.sync.snapshot(auth.user_id).await?;

    let mut headers = HeaderMap::new();
    if let Some(etag) = snapshot.hash.as_deref().and_then(etag_header) {
        headers.insert(ETAG, etag);
    }

    Ok((
        headers,
        Json(DataResponse {
            data: snapshot.gifts,
        }),
    )
        .into_response())
}

/// GET /api/v1/gifts/poll?since=<hash>
///
/// Answers immediately when the stored hash differs from `since`, otherwise
/// waits for the next published change. Returns 202 `refreshing` if nothing
/// arrives within the configured bound.
pub async fn poll_gifts(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PollQuery>,
) -> AppResult<Response> {
    let since = params.since.as_deref().map(|s| s.trim_matches('"'));
    let outcome = state
        .sync
        .wait_for_change(auth.user_id, since, state.config.sync.poll_wait())
        .await?;

    let response = match outcome {
        WaitOutcome::Ready { gifts, hash } => (
            StatusCode::OK,
            Json(DataResponse {
                data: PollResponse::Ready { hash, items: gifts },
            }),
        ),
        WaitOutcome::Refreshing => (
            StatusCode::ACCEPTED,
            Json(DataResponse {
                data: PollResponse::Refreshing,
            }),
        ),
    };
    Ok(response.into_response())
}

// ---------------------------------------------------------------------------
// Manual refresh
// ---------------------------------------------------------------------------

/// POST /api/v1/gifts/refresh
///
/// Runs one collector pass, joining a pass already in flight. With
/// `?stream=1` or `Accept: application/x-ndjson` the response is a stream of
/// progress records; the pass keeps running if the client disconnects.
pub async fn refresh_gifts(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<RefreshQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    if wants_stream(&params, &headers) {
        let sync = state.sync.clone();
        let user_id = auth.user_id;
        let outcome = stream::once(async move {
            match sync.refresh(user_id).await {
                Ok(report) => vec![
                    RefreshProgress::Fetched {
                        count: report.gifts.len(),
                    },
                    RefreshProgress::Done {
                        items: report.gifts.clone(),
                    },
                ],
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Streamed gift refresh failed");
                    vec![RefreshProgress::failed(&e)]
                }
            }
        })
        .flat_map(stream::iter);

        let records = stream::once(future::ready(RefreshProgress::Start)).chain(outcome);
        return Ok(ndjson_response(records));
    }

    let report = state.sync.refresh(auth.user_id).await?;
    Ok(Json(DataResponse {
        data: report.gifts.clone(),
    })
    .into_response())
}

fn wants_stream(params: &RefreshQuery, headers: &HeaderMap) -> bool {
    let by_query = params
        .stream
        .as_deref()
        .is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes"));
    let by_accept = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(NDJSON_CONTENT_TYPE));
    by_query || by_accept
}

// ---------------------------------------------------------------------------
// Live stream
// ---------------------------------------------------------------------------

/// GET /api/v1/gifts/stream
///
/// Server-sent events: a `snapshot` event with the stored snapshot, then a
/// `gifts` event per published change. The stream ends if the client falls
/// too far behind.
pub async fn stream_gifts(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    // Subscribe first so a change published while reading is not lost.
    let subscription = state.sync.bus().subscribe(auth.user_id);
    let current = state.sync.snapshot(auth.user_id).await?;

    let initial = Event::default().event("snapshot").json_data(SnapshotEvent {
        event_type: "snapshot",
        count: current.gifts.len(),
        payload: current.gifts,
        hash: current.hash,
    });
    let updates = subscription
        .into_stream()
        .map(|event| Event::default().event(GIFTS_EVENT).json_data(&*event));

    tracing::debug!(user_id = auth.user_id, "Live gift stream opened");
    let events = stream::once(future::ready(initial)).chain(updates);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ---------------------------------------------------------------------------
// Status and settings
// ---------------------------------------------------------------------------

/// GET /api/v1/gifts/status
pub async fn sync_status(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<SyncStatus>>> {
    let status = state.sync.status(auth.user_id).await?;
    Ok(Json(DataResponse { data: status }))
}

/// GET /api/v1/gifts/settings
pub async fn get_settings(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<GiftSettings>>> {
    let status = state.sync.status(auth.user_id).await?;
    Ok(Json(DataResponse {
        data: GiftSettings {
            auto_refresh: status.auto_refresh,
        },
    }))
}

/// PUT /api/v1/gifts/settings
///
/// Enabling starts the caller's auto-refresh timer; disabling stops it
/// without cancelling a pass already running.
pub async fn update_settings(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<GiftSettings>,
) -> AppResult<Json<DataResponse<GiftSettings>>> {
    state
        .sync
        .set_auto_refresh(auth.user_id, input.auto_refresh)
        .await?;
    tracing::info!(
        user_id = auth.user_id,
        auto_refresh = input.auto_refresh,
        "Gift settings updated",
    );
    Ok(Json(DataResponse { data: input }))
}
