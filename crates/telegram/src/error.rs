//! Classified remote failures.
//!
//! Every failure coming back from a linked account's session is mapped onto
//! one of four classes. Only [`RemoteError::SessionInvalid`] is terminal for
//! the account; everything else is retried on a later cycle.

use std::time::Duration;

/// RPC codes meaning the account's session is gone for good.
const SESSION_INVALID_CODES: &[&str] = &[
    "AUTH_KEY_UNREGISTERED",
    "AUTH_KEY_INVALID",
    "SESSION_REVOKED",
    "USER_DEACTIVATED",
    "USER_DEACTIVATED_BAN",
];

const RATE_LIMIT_PREFIXES: &[&str] = &["FLOOD_WAIT", "SLOWMODE_WAIT"];

const TRANSIENT_CODES: &[&str] = &["TIMEOUT", "INTERNAL_SERVER_ERROR"];

/// A classified failure from a remote account operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Credentials or session revoked. The account must be removed.
    #[error("session invalid ({code})")]
    SessionInvalid { code: String },

    /// The platform asked us to back off.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Network-level failure; retried on the next cycle.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Anything else. Logged and treated as transient.
    #[error("unexpected remote error: {0}")]
    Unexpected(String),
}

impl RemoteError {
    /// Classify a platform RPC error code.
    ///
    /// `retry_after_secs` is the server's backoff hint when it sent one
    /// separately; `FLOOD_WAIT_17`-style codes carry it inline.
    pub fn from_rpc_code(code: &str, retry_after_secs: Option<u64>, detail: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();

        if SESSION_INVALID_CODES.contains(&code.as_str()) {
            return Self::SessionInvalid { code };
        }

        if let Some(prefix) = RATE_LIMIT_PREFIXES.iter().find(|p| code.starts_with(**p)) {
            let inline = code[prefix.len()..]
                .trim_start_matches(['_', '-'])
                .parse::<u64>()
                .ok();
            return Self::RateLimited {
                retry_after: retry_after_secs.or(inline).map(Duration::from_secs),
            };
        }

        if TRANSIENT_CODES.contains(&code.as_str()) {
            return Self::TransientNetwork(format!("{code}: {detail}"));
        }

        Self::Unexpected(format!("{code}: {detail}"))
    }

    /// `false` only for failures that end the account's life.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::SessionInvalid { .. })
    }

    /// Stable machine-readable code for progress/error records.
    pub fn code(&self) -> &str {
        match self {
            Self::SessionInvalid { code } => code,
            Self::RateLimited { .. } => "FLOOD_WAIT",
            Self::TransientNetwork(_) => "NETWORK",
            Self::Unexpected(_) => "UNEXPECTED",
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL may embed credentials.
        let e = e.without_url();
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::TransientNetwork(e.to_string())
        } else {
            Self::Unexpected(e.to_string())
        }
    }
}
