//! Persisted gift snapshot rows.

use giftpanel_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `gift_snapshots` table.
///
/// `items` holds the merged gift list as a JSON array.
#[derive(Debug, Clone, FromRow)]
pub struct GiftSnapshotRow {
    pub user_id: DbId,
    pub items: serde_json::Value,
    pub content_hash: Option<String>,
    pub last_polled_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// DTO for replacing a user's snapshot.
#[derive(Debug, Clone)]
pub struct UpsertGiftSnapshot {
    pub items: serde_json::Value,
    pub content_hash: Option<String>,
    pub last_polled_at: Timestamp,
}
