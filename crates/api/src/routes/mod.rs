pub mod accounts;
pub mod gifts;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /gifts                                 snapshot (GET)
/// /gifts/poll                            poll-with-wait (GET)
/// /gifts/refresh                         manual refresh (POST, JSON or NDJSON)
/// /gifts/stream                          live updates (GET, SSE)
/// /gifts/status                          worker status (GET)
/// /gifts/settings                        auto-refresh flag (GET, PUT)
/// /gifts/sticker.lottie                  decoded sticker (GET)
///
/// /accounts/{id}/refresh                 single-account refresh (POST, NDJSON)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/gifts", gifts::router())
        .nest("/accounts", accounts::router())
}
