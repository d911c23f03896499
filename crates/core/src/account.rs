//! Linked account records shared by the engine and the remote boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Opaque handle used to address one linked account's remote session.
///
/// Carries credentials, so `Debug` redacts everything except the ids.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountHandle {
    pub account_id: DbId,
    pub user_id: DbId,
    /// Reference to the persisted session, resolved by the session gateway.
    pub session_ref: String,
    pub api_id: i64,
    pub api_hash: String,
}

impl fmt::Debug for AccountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountHandle")
            .field("account_id", &self.account_id)
            .field("user_id", &self.user_id)
            .field("session_ref", &"<redacted>")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .finish()
    }
}

/// The profile/balance view of an account returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: DbId,
    pub phone: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub is_premium: bool,
    /// Premium expiry as shown by the platform (`dd.mm.yyyy`).
    pub premium_until: Option<String>,
    pub stars: i64,
    pub last_checked_at: Option<Timestamp>,
}

/// Fields written back after a single-account refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub is_premium: bool,
    pub premium_until: Option<String>,
    pub stars: i64,
    pub checked_at: Timestamp,
}
