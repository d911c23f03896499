//! Route definitions for the `/gifts` resource.
//!
//! All endpoints require authentication.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{gifts, stickers};
use crate::state::AppState;

/// Routes mounted at `/gifts`.
///
/// ```text
/// GET    /                  -> list_gifts
/// GET    /poll              -> poll_gifts
/// POST   /refresh           -> refresh_gifts
/// GET    /stream            -> stream_gifts
/// GET    /status            -> sync_status
/// GET    /settings          -> get_settings
/// PUT    /settings          -> update_settings
/// GET    /sticker.lottie    -> sticker_lottie
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(gifts::list_gifts))
        .route("/poll", get(gifts::poll_gifts))
        .route("/refresh", post(gifts::refresh_gifts))
        .route("/stream", get(gifts::stream_gifts))
        .route("/status", get(gifts::sync_status))
        .route(
            "/settings",
            get(gifts::get_settings).put(gifts::update_settings),
        )
        .route("/sticker.lottie", get(stickers::sticker_lottie))
}
