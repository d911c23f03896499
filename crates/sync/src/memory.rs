//! In-memory store implementations for tests and database-less local runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use giftpanel_core::account::{AccountSnapshot, ProfileUpdate};
use giftpanel_core::types::{DbId, Timestamp};

use crate::store::{
    AccountDirectory, LinkedAccount, SettingsStore, SnapshotStore, StoreError, StoredSnapshot,
};

/// Implements every store trait in process memory.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<BTreeMap<DbId, LinkedAccount>>,
    snapshots: RwLock<HashMap<DbId, StoredSnapshot>>,
    bot_tokens: RwLock<HashMap<DbId, String>>,
    auto_refresh: RwLock<BTreeSet<DbId>>,
    fail_snapshot_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, account: LinkedAccount) {
        self.accounts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account.id(), account);
    }

    pub fn set_bot_token(&self, user_id: DbId, token: Option<&str>) {
        let mut tokens = self.bot_tokens.write().unwrap_or_else(|e| e.into_inner());
        match token {
            Some(t) => tokens.insert(user_id, t.to_string()),
            None => tokens.remove(&user_id),
        };
    }

    /// Make every subsequent snapshot write fail.
    pub fn fail_snapshot_writes(&self, fail: bool) {
        self.fail_snapshot_writes.store(fail, Ordering::SeqCst);
    }

    /// Ids of the user's remaining accounts.
    pub fn account_ids(&self, user_id: DbId) -> Vec<DbId> {
        self.accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|a| a.handle.user_id == user_id)
            .map(LinkedAccount::id)
            .collect()
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn list_accounts(&self, user_id: DbId) -> Result<Vec<LinkedAccount>, StoreError> {
        Ok(self
            .accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|a| a.handle.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_account(
        &self,
        user_id: DbId,
        account_id: DbId,
    ) -> Result<Option<LinkedAccount>, StoreError> {
        Ok(self
            .accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&account_id)
            .filter(|a| a.handle.user_id == user_id)
            .cloned())
    }

    async fn save_profile(
        &self,
        user_id: DbId,
        account_id: DbId,
        update: &ProfileUpdate,
    ) -> Result<Option<AccountSnapshot>, StoreError> {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        let Some(account) = accounts
            .get_mut(&account_id)
            .filter(|a| a.handle.user_id == user_id)
        else {
            return Ok(None);
        };

        let snapshot = &mut account.snapshot;
        snapshot.username = update.username.clone();
        snapshot.first_name = update.first_name.clone();
        snapshot.is_premium = update.is_premium;
        snapshot.premium_until = update.premium_until.clone();
        snapshot.stars = update.stars;
        snapshot.last_checked_at = Some(update.checked_at);
        Ok(Some(snapshot.clone()))
    }

    async fn remove_account(&self, user_id: DbId, account_id: DbId) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        let owned = accounts
            .get(&account_id)
            .is_some_and(|a| a.handle.user_id == user_id);
        Ok(owned && accounts.remove(&account_id).is_some())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self, user_id: DbId) -> Result<Option<StoredSnapshot>, StoreError> {
        Ok(self
            .snapshots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .cloned())
    }

    async fn save(&self, user_id: DbId, snapshot: &StoredSnapshot) -> Result<(), StoreError> {
        if self.fail_snapshot_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("snapshot writes disabled".into()));
        }
        self.snapshots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id, snapshot.clone());
        Ok(())
    }

    async fn record_poll(&self, user_id: DbId, polled_at: Timestamp) -> Result<(), StoreError> {
        if self.fail_snapshot_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("snapshot writes disabled".into()));
        }
        self.snapshots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(user_id)
            .or_default()
            .last_polled_at = Some(polled_at);
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn bot_token(&self, user_id: DbId) -> Result<Option<String>, StoreError> {
        Ok(self
            .bot_tokens
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }

    async fn auto_refresh(&self, user_id: DbId) -> Result<bool, StoreError> {
        Ok(self
            .auto_refresh
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&user_id))
    }

    async fn set_auto_refresh(&self, user_id: DbId, enabled: bool) -> Result<(), StoreError> {
        let mut users = self.auto_refresh.write().unwrap_or_else(|e| e.into_inner());
        if enabled {
            users.insert(user_id);
        } else {
            users.remove(&user_id);
        }
        Ok(())
    }

    async fn auto_refresh_users(&self) -> Result<Vec<DbId>, StoreError> {
        Ok(self
            .auto_refresh
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect())
    }
}
