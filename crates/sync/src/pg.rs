//! PostgreSQL-backed stores over the `giftpanel-db` repositories.

use async_trait::async_trait;
use giftpanel_core::account::{AccountSnapshot, ProfileUpdate};
use giftpanel_core::types::{DbId, Timestamp};
use giftpanel_db::models::account::{AccountRow, UpdateAccountProfile};
use giftpanel_db::models::gift_snapshot::UpsertGiftSnapshot;
use giftpanel_db::repositories::{AccountRepo, GiftSnapshotRepo, UserSettingsRepo};
use giftpanel_db::DbPool;

use crate::store::{
    AccountDirectory, LinkedAccount, SettingsStore, SnapshotStore, StoreError, StoredSnapshot,
};

/// Implements every store trait on one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn linked(row: AccountRow) -> LinkedAccount {
    LinkedAccount {
        handle: row.handle(),
        snapshot: row.snapshot(),
    }
}

#[async_trait]
impl AccountDirectory for PgStore {
    async fn list_accounts(&self, user_id: DbId) -> Result<Vec<LinkedAccount>, StoreError> {
        let rows = AccountRepo::list_for_user(&self.pool, user_id).await?;
        Ok(rows.into_iter().map(linked).collect())
    }

    async fn find_account(
        &self,
        user_id: DbId,
        account_id: DbId,
    ) -> Result<Option<LinkedAccount>, StoreError> {
        let row = AccountRepo::find_for_user(&self.pool, user_id, account_id).await?;
        Ok(row.map(linked))
    }

    async fn save_profile(
        &self,
        user_id: DbId,
        account_id: DbId,
        update: &ProfileUpdate,
    ) -> Result<Option<AccountSnapshot>, StoreError> {
        let dto = UpdateAccountProfile {
            username: update.username.clone(),
            first_name: update.first_name.clone(),
            is_premium: update.is_premium,
            premium_until: update.premium_until.clone(),
            stars_amount: update.stars,
            last_checked_at: update.checked_at,
        };
        let row = AccountRepo::update_profile(&self.pool, user_id, account_id, &dto).await?;
        Ok(row.map(|r| r.snapshot()))
    }

    async fn remove_account(&self, user_id: DbId, account_id: DbId) -> Result<bool, StoreError> {
        Ok(AccountRepo::delete(&self.pool, user_id, account_id).await?)
    }
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn load(&self, user_id: DbId) -> Result<Option<StoredSnapshot>, StoreError> {
        let Some(row) = GiftSnapshotRepo::get(&self.pool, user_id).await? else {
            return Ok(None);
        };
        Ok(Some(StoredSnapshot {
            gifts: serde_json::from_value(row.items)?,
            hash: row.content_hash,
            last_polled_at: row.last_polled_at,
        }))
    }

    async fn save(&self, user_id: DbId, snapshot: &StoredSnapshot) -> Result<(), StoreError> {
        let dto = UpsertGiftSnapshot {
            items: serde_json::to_value(&snapshot.gifts)?,
            content_hash: snapshot.hash.clone(),
            last_polled_at: snapshot.last_polled_at.unwrap_or_else(chrono::Utc::now),
        };
        GiftSnapshotRepo::upsert(&self.pool, user_id, &dto).await?;
        Ok(())
    }

    async fn record_poll(&self, user_id: DbId, polled_at: Timestamp) -> Result<(), StoreError> {
        Ok(GiftSnapshotRepo::touch_polled(&self.pool, user_id, polled_at).await?)
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn bot_token(&self, user_id: DbId) -> Result<Option<String>, StoreError> {
        Ok(UserSettingsRepo::bot_token(&self.pool, user_id).await?)
    }

    async fn auto_refresh(&self, user_id: DbId) -> Result<bool, StoreError> {
        Ok(UserSettingsRepo::auto_refresh(&self.pool, user_id).await?)
    }

    async fn set_auto_refresh(&self, user_id: DbId, enabled: bool) -> Result<(), StoreError> {
        UserSettingsRepo::set_auto_refresh(&self.pool, user_id, enabled).await?;
        Ok(())
    }

    async fn auto_refresh_users(&self) -> Result<Vec<DbId>, StoreError> {
        Ok(UserSettingsRepo::list_auto_refresh_users(&self.pool).await?)
    }
}
