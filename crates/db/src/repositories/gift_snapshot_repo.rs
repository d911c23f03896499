//! Repository for the `gift_snapshots` table.
//!
//! Exactly one row per user: writes are upserts, never appends.

use giftpanel_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::gift_snapshot::{GiftSnapshotRow, UpsertGiftSnapshot};

/// Column list for `gift_snapshots` queries.
const COLUMNS: &str = "user_id, items, content_hash, last_polled_at, updated_at";

/// Provides data access for persisted gift snapshots.
pub struct GiftSnapshotRepo;

impl GiftSnapshotRepo {
    pub async fn get(pool: &PgPool, user_id: DbId) -> Result<Option<GiftSnapshotRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM gift_snapshots WHERE user_id = $1");
        sqlx::query_as::<_, GiftSnapshotRow>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Replace the user's snapshot.
    pub async fn upsert(
        pool: &PgPool,
        user_id: DbId,
        dto: &UpsertGiftSnapshot,
    ) -> Result<GiftSnapshotRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO gift_snapshots (user_id, items, content_hash, last_polled_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 items = EXCLUDED.items, \
                 content_hash = EXCLUDED.content_hash, \
                 last_polled_at = EXCLUDED.last_polled_at, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GiftSnapshotRow>(&query)
            .bind(user_id)
            .bind(&dto.items)
            .bind(&dto.content_hash)
            .bind(dto.last_polled_at)
            .fetch_one(pool)
            .await
    }

    /// Advance only the poll timestamp, creating an empty row if needed.
    pub async fn touch_polled(
        pool: &PgPool,
        user_id: DbId,
        polled_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO gift_snapshots (user_id, last_polled_at) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET last_polled_at = EXCLUDED.last_polled_at",
        )
        .bind(user_id)
        .bind(polled_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
