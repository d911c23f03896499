//! Shared response helpers for API handlers.
//!
//! All JSON responses use a `{ "data": ... }` envelope. Streaming endpoints
//! emit newline-delimited JSON through [`ndjson_response`].

use std::convert::Infallible;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use serde::Serialize;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Serialize one record as a JSON line.
pub fn ndjson_line<T: Serialize>(record: &T) -> String {
    let mut line = serde_json::to_string(record).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize stream record");
        r#"{"error":"serialization_failed"}"#.to_string()
    });
    line.push('\n');
    line
}

/// Stream records as `application/x-ndjson`, one JSON object per line.
pub fn ndjson_response<S, T>(records: S) -> Response
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + 'static,
{
    let lines = records.map(|record| Ok::<_, Infallible>(ndjson_line(&record)));
    (
        [
            (CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE)),
            (CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        Body::from_stream(lines),
    )
        .into_response()
}
