//! Per-(user, linked account) mutual exclusion for remote calls.
//!
//! Every code path that talks to a linked account's session acquires the
//! account's lock first: the gift collector and the single-account refresh
//! share one [`SessionLockManager`], so their remote calls never interleave.
//! Acquisition waits rather than skipping, because the waiting operation
//! still has to run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use giftpanel_core::types::{DbId, Timestamp};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

type LockKey = (DbId, DbId);

/// Who holds a session lock and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockHolder {
    pub holder: String,
    pub acquired_at: Timestamp,
}

/// One lock slot. Created on first use and reused forever.
#[derive(Default)]
struct SessionSlot {
    gate: Arc<tokio::sync::Mutex<()>>,
    holder: Mutex<Option<LockHolder>>,
}

/// Registry of session locks keyed by `(user_id, account_id)`.
#[derive(Default)]
pub struct SessionLockManager {
    slots: Mutex<HashMap<LockKey, Arc<SessionSlot>>>,
}

impl SessionLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the account's lock is free, then take it.
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn acquire(
        &self,
        user_id: DbId,
        account_id: DbId,
        holder: impl Into<String>,
    ) -> SessionGuard {
        let slot = self.slot(user_id, account_id);
        let permit = Arc::clone(&slot.gate).lock_owned().await;
        SessionGuard::new(slot, permit, user_id, account_id, holder.into())
    }

    /// Take the lock only if it is free right now.
    pub fn try_acquire(
        &self,
        user_id: DbId,
        account_id: DbId,
        holder: impl Into<String>,
    ) -> Option<SessionGuard> {
        let slot = self.slot(user_id, account_id);
        let permit = Arc::clone(&slot.gate).try_lock_owned().ok()?;
        Some(SessionGuard::new(
            slot,
            permit,
            user_id,
            account_id,
            holder.into(),
        ))
    }

    /// Current holder of an account's lock, if any.
    pub fn holder(&self, user_id: DbId, account_id: DbId) -> Option<LockHolder> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&(user_id, account_id))
            .and_then(|slot| slot.holder.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn slot(&self, user_id: DbId, account_id: DbId) -> Arc<SessionSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry((user_id, account_id)).or_default())
    }
}

/// Exclusive access to one account's remote session.
pub struct SessionGuard {
    slot: Arc<SessionSlot>,
    _permit: OwnedMutexGuard<()>,
    user_id: DbId,
    account_id: DbId,
    holder: LockHolder,
}

impl SessionGuard {
    fn new(
        slot: Arc<SessionSlot>,
        permit: OwnedMutexGuard<()>,
        user_id: DbId,
        account_id: DbId,
        holder: String,
    ) -> Self {
        let holder = LockHolder {
            holder,
            acquired_at: Utc::now(),
        };
        *slot.holder.lock().unwrap_or_else(|e| e.into_inner()) = Some(holder.clone());
        tracing::debug!(user_id, account_id, holder = %holder.holder, "Session lock acquired");
        Self {
            slot,
            _permit: permit,
            user_id,
            account_id,
            holder,
        }
    }

    pub fn holder(&self) -> &LockHolder {
        &self.holder
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Runs before `_permit` is released.
        *self.slot.holder.lock().unwrap_or_else(|e| e.into_inner()) = None;
        tracing::debug!(
            user_id = self.user_id,
            account_id = self.account_id,
            holder = %self.holder.holder,
            "Session lock released"
        );
    }
}
