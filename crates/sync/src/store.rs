//! Persistence seams consumed by the engine.
//!
//! Account management, settings and snapshot storage belong to other parts
//! of the panel; the engine only needs the narrow contracts below.

use async_trait::async_trait;
use giftpanel_core::account::{AccountHandle, AccountSnapshot, ProfileUpdate};
use giftpanel_core::gift::Gift;
use giftpanel_core::types::{DbId, Timestamp};

/// Errors from any store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A linked account as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedAccount {
    pub handle: AccountHandle,
    pub snapshot: AccountSnapshot,
}

impl LinkedAccount {
    pub fn id(&self) -> DbId {
        self.handle.account_id
    }
}

/// The persisted view of a user's latest merged snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub gifts: Vec<Gift>,
    /// Digest of `gifts` as last published.
    pub hash: Option<String>,
    pub last_polled_at: Option<Timestamp>,
}

/// Read/write access to a user's linked accounts.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// All accounts of a user, ordered by account id ascending.
    async fn list_accounts(&self, user_id: DbId) -> Result<Vec<LinkedAccount>, StoreError>;

    async fn find_account(
        &self,
        user_id: DbId,
        account_id: DbId,
    ) -> Result<Option<LinkedAccount>, StoreError>;

    /// Write refreshed profile fields; `None` if the account is gone.
    async fn save_profile(
        &self,
        user_id: DbId,
        account_id: DbId,
        update: &ProfileUpdate,
    ) -> Result<Option<AccountSnapshot>, StoreError>;

    /// Remove an account whose session was revoked.
    async fn remove_account(&self, user_id: DbId, account_id: DbId) -> Result<bool, StoreError>;
}

/// Durable per-user snapshot storage. Exactly one snapshot per user.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, user_id: DbId) -> Result<Option<StoredSnapshot>, StoreError>;

    /// Replace the user's snapshot.
    async fn save(&self, user_id: DbId, snapshot: &StoredSnapshot) -> Result<(), StoreError>;

    /// Advance the poll timestamp without touching gifts or hash.
    async fn record_poll(&self, user_id: DbId, polled_at: Timestamp) -> Result<(), StoreError>;
}

/// Per-user settings the engine reads and writes.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn bot_token(&self, user_id: DbId) -> Result<Option<String>, StoreError>;

    async fn auto_refresh(&self, user_id: DbId) -> Result<bool, StoreError>;

    async fn set_auto_refresh(&self, user_id: DbId, enabled: bool) -> Result<(), StoreError>;

    /// Users whose auto-refresh flag is set.
    async fn auto_refresh_users(&self) -> Result<Vec<DbId>, StoreError>;
}
