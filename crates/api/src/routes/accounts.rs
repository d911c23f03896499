//! Route definitions for the `/accounts` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::accounts;
use crate::state::AppState;

/// Routes mounted at `/accounts`.
///
/// ```text
/// POST   /{id}/refresh      -> refresh_account
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/refresh", post(accounts::refresh_account))
}
