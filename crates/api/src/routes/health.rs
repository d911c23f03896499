//! Liveness endpoint, mounted at the root rather than under `/api/v1`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    /// Database reachability; omitted when running on in-memory stores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<bool>,
    /// Live gift subscribers across all users.
    pub live_subscribers: usize,
}

/// GET /health
///
/// 200 while every configured dependency answers, 503 otherwise.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.pool {
        Some(pool) => Some(giftpanel_db::health_check(pool).await.is_ok()),
        None => None,
    };
    let (code, status) = match database {
        Some(false) => (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Degraded),
        _ => (StatusCode::OK, HealthStatus::Ok),
    };

    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        database,
        live_subscribers: state.sync.bus().total_subscribers(),
    };
    (code, Json(body))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
