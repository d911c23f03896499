//! Handler for decoded gift sticker animations.

use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Entries never change once cached.
const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Query parameters for `GET /gifts/sticker.lottie`.
#[derive(Debug, Deserialize)]
pub struct StickerQuery {
    pub file_id: Option<String>,
    /// The sticker's `file_unique_id`.
    pub uniq: Option<String>,
}

/// GET /api/v1/gifts/sticker.lottie?file_id=&uniq=
///
/// Serves the decoded Lottie JSON. Honors `If-None-Match` with a 304.
pub async fn sticker_lottie(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<StickerQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let payload = state
        .stickers
        .get(auth.user_id, params.uniq.as_deref(), params.file_id.as_deref())
        .await?;

    let etag = HeaderValue::from_str(&format!("\"{}\"", payload.etag))
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let cache_control = HeaderValue::from_static(IMMUTABLE_CACHE_CONTROL);

    if if_none_match(&headers, &payload.etag) {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [(ETAG, etag), (CACHE_CONTROL, cache_control)],
        )
            .into_response());
    }

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (ETAG, etag),
            (CACHE_CONTROL, cache_control),
        ],
        payload.json.clone(),
    )
        .into_response())
}

/// `true` when the request's `If-None-Match` lists `etag` (quoted, weak or
/// bare) or `*`.
fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|tag| tag.trim().trim_start_matches("W/").trim_matches('"'))
        .any(|tag| tag == "*" || tag == etag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(IF_NONE_MATCH, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn matches_quoted_weak_and_listed_tags() {
        assert!(if_none_match(&headers("\"abc\""), "abc"));
        assert!(if_none_match(&headers("W/\"abc\""), "abc"));
        assert!(if_none_match(&headers("\"x\", \"abc\""), "abc"));
        assert!(if_none_match(&headers("*"), "abc"));
    }

    #[test]
    fn different_or_missing_tag_does_not_match() {
        assert!(!if_none_match(&headers("\"other\""), "abc"));
        assert!(!if_none_match(&HeaderMap::new(), "abc"));
    }
}
