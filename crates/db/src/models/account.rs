//! Linked account rows.

use giftpanel_core::account::{AccountHandle, AccountSnapshot};
use giftpanel_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from `accounts` joined with its `api_profiles` credentials.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AccountRow {
    pub id: DbId,
    pub user_id: DbId,
    pub api_profile_id: DbId,
    pub phone: String,
    #[serde(skip_serializing)]
    pub session_path: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub is_premium: bool,
    pub premium_until: Option<String>,
    pub stars_amount: i64,
    pub last_checked_at: Option<Timestamp>,
    #[serde(skip_serializing)]
    pub api_id: i64,
    #[serde(skip_serializing)]
    pub api_hash: String,
}

impl AccountRow {
    /// The opaque handle the remote boundary addresses this account by.
    pub fn handle(&self) -> AccountHandle {
        AccountHandle {
            account_id: self.id,
            user_id: self.user_id,
            session_ref: self.session_path.clone(),
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
        }
    }

    /// The client-facing profile view of this account.
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            id: self.id,
            phone: self.phone.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            is_premium: self.is_premium,
            premium_until: self.premium_until.clone(),
            stars: self.stars_amount,
            last_checked_at: self.last_checked_at,
        }
    }
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Profile fields written after a single-account refresh.
#[derive(Debug, Clone)]
pub struct UpdateAccountProfile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub is_premium: bool,
    pub premium_until: Option<String>,
    pub stars_amount: i64,
    pub last_checked_at: Timestamp,
}
