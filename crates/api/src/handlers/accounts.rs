//! Handlers for the `/accounts` resource.

use axum::extract::{Path, State};
use axum::response::Response;
use giftpanel_core::types::DbId;
use tokio_stream::wrappers::ReceiverStream;

use crate::middleware::auth::AuthUser;
use crate::response::ndjson_response;
use crate::state::AppState;

/// POST /api/v1/accounts/{id}/refresh
///
/// Streams stage records as NDJSON, ending in `{"done": true, "account"}`
/// or an error record. Disconnecting stops the refresh at the next stage.
pub async fn refresh_account(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(account_id): Path<DbId>,
) -> Response {
    let records = state.account_refresh.start(auth.user_id, account_id);
    ndjson_response(ReceiverStream::new(records))
}
