use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use giftpanel_core::error::CoreError;
use giftpanel_sync::{StickerError, SyncError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors plus the engine's sync and sticker
/// errors. Implements [`IntoResponse`] to produce consistent JSON error
/// responses of the form `{"error", "code", "detail"?}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Sticker(#[from] StickerError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

struct ErrorBody {
    status: StatusCode,
    code: &'static str,
    message: String,
    detail: Option<String>,
}

impl ErrorBody {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match &self {
            AppError::Core(CoreError::Validation(msg)) => {
                ErrorBody::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Core(CoreError::Unauthorized(msg)) => {
                ErrorBody::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }

            // --- Sync engine ---
            AppError::Sync(err) => classify_sync_error(err),

            // --- Sticker cache ---
            AppError::Sticker(err) => classify_sticker_error(err),

            // --- HTTP-specific errors ---
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ErrorBody::internal()
            }
        };

        let mut json = json!({
            "error": body.message,
            "code": body.code,
        });
        if let Some(detail) = body.detail {
            json["detail"] = detail.into();
        }

        (body.status, axum::Json(json)).into_response()
    }
}

/// Map pass failures onto the codes the gifts UI understands.
fn classify_sync_error(err: &SyncError) -> ErrorBody {
    match err {
        SyncError::NoAccounts => ErrorBody::new(StatusCode::CONFLICT, "NO_ACCOUNTS", "no_accounts"),
        SyncError::AllAccountsFailed { failures } => {
            let detail = failures
                .iter()
                .map(|f| format!("account {}: {}", f.account_id, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            ErrorBody::new(StatusCode::BAD_GATEWAY, "REFRESH_FAILED", "refresh_failed")
                .with_detail(detail)
        }
        SyncError::Interrupted => {
            ErrorBody::new(StatusCode::BAD_GATEWAY, "REFRESH_FAILED", "refresh_failed")
                .with_detail(err.to_string())
        }
        SyncError::Store(msg) => {
            tracing::error!(error = %msg, "Gift store error");
            ErrorBody::internal()
        }
    }
}

fn classify_sticker_error(err: &StickerError) -> ErrorBody {
    match err {
        StickerError::MissingIdentifier
        | StickerError::InvalidKey(_)
        | StickerError::FileIdRequired => {
            ErrorBody::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
        }
        StickerError::NoBotToken => {
            ErrorBody::new(StatusCode::CONFLICT, "NO_BOT_TOKEN", "no_bot_token")
        }
        StickerError::Malformed(e) => {
            ErrorBody::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, "BAD_TGS", "bad_tgs")
                .with_detail(e.to_string())
        }
        StickerError::DownloadFailed(e) => {
            ErrorBody::new(StatusCode::BAD_GATEWAY, "DOWNLOAD_FAILED", "download_failed")
                .with_detail(e.to_string())
        }
        StickerError::Store(e) => {
            tracing::error!(error = %e, "Sticker settings lookup failed");
            ErrorBody::internal()
        }
    }
}
