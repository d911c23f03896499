//! Per-user settings rows.

use giftpanel_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `user_settings` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserSettings {
    pub user_id: DbId,
    pub bot_token: Option<String>,
    pub gifts_auto_refresh: bool,
    pub updated_at: Timestamp,
}
