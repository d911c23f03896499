//! Gift catalog domain types.
//!
//! [`Gift`] is the merged, user-facing view of one catalog item across all of
//! a user's linked accounts. [`ObservedGift`] is what a single account sees
//! on one fetch; the collector folds observations into gifts via
//! [`crate::merge::merge_observations`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Per-account purchase locks: linked account id -> lock expiry.
///
/// A `None` expiry means the platform reported the gift as locked for that
/// account without a usable date. Such entries persist until the owning
/// account next reports the gift.
pub type GiftLocks = BTreeMap<DbId, Option<Timestamp>>;

// ---------------------------------------------------------------------------
// Gift
// ---------------------------------------------------------------------------

/// A purchasable catalog item as published to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gift {
    /// Platform gift id. Stable across polls.
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub price: i64,
    #[serde(default)]
    pub supply: Option<i64>,
    pub is_limited: bool,
    #[serde(default)]
    pub available_amount: Option<i64>,
    #[serde(default)]
    pub total_amount: Option<i64>,
    #[serde(default)]
    pub limited_per_user: bool,
    #[serde(default)]
    pub per_user_available: Option<i64>,
    #[serde(default)]
    pub per_user_remains: Option<i64>,
    #[serde(default)]
    pub require_premium: bool,
    #[serde(default)]
    pub sticker_file_id: Option<String>,
    #[serde(default)]
    pub sticker_unique_id: Option<String>,
    #[serde(default)]
    pub sticker_mime: Option<String>,
    #[serde(default)]
    pub locks: GiftLocks,
    /// Earliest dated lock in `locks`. Derived; recomputed on every prune.
    #[serde(default)]
    pub locked_until_date: Option<Timestamp>,
}

impl Gift {
    /// Build a fresh gift from a single account's observation.
    ///
    /// The lock map starts empty; the caller records the observing
    /// account's own lock entry.
    pub fn from_observed(observed: &ObservedGift) -> Self {
        Self {
            id: observed.id.clone(),
            title: observed.title.clone(),
            price: observed.price,
            supply: observed.supply,
            is_limited: observed.is_limited,
            available_amount: observed.available_amount,
            total_amount: observed.total_amount,
            limited_per_user: observed.limited_per_user,
            per_user_available: observed.per_user_available,
            per_user_remains: observed.per_user_remains,
            require_premium: observed.require_premium,
            sticker_file_id: observed.sticker_file_id.clone(),
            sticker_unique_id: observed.sticker_unique_id.clone(),
            sticker_mime: observed.sticker_mime.clone(),
            locks: GiftLocks::new(),
            locked_until_date: None,
        }
    }

    /// Overwrite every catalog field with a more recent observation.
    ///
    /// Lock entries are left alone: each account owns only its own entry.
    pub fn apply_observation(&mut self, observed: &ObservedGift) {
        let locks = std::mem::take(&mut self.locks);
        *self = Self {
            locks,
            ..Self::from_observed(observed)
        };
    }

    /// Drop lock entries whose expiry is at or before `now` and recompute
    /// [`Gift::locked_until_date`].
    pub fn prune_expired_locks(&mut self, now: Timestamp) {
        self.locks
            .retain(|_, expiry| expiry.map_or(true, |until| until > now));
        self.locked_until_date = self.locks.values().flatten().min().copied();
    }

    /// The lock expiry recorded for `account_id`, if the account holds a lock.
    pub fn lock_for(&self, account_id: DbId) -> Option<Option<Timestamp>> {
        self.locks.get(&account_id).copied()
    }
}

// ---------------------------------------------------------------------------
// ObservedGift
// ---------------------------------------------------------------------------

/// One account's view of a catalog item, as returned by a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedGift {
    pub id: String,
    pub title: Option<String>,
    pub price: i64,
    pub supply: Option<i64>,
    pub is_limited: bool,
    pub available_amount: Option<i64>,
    pub total_amount: Option<i64>,
    pub limited_per_user: bool,
    pub per_user_available: Option<i64>,
    pub per_user_remains: Option<i64>,
    pub require_premium: bool,
    pub sticker_file_id: Option<String>,
    pub sticker_unique_id: Option<String>,
    pub sticker_mime: Option<String>,
    /// The platform flagged the gift as locked for this account.
    pub locked: bool,
    /// When the account's purchase lock ends, if the platform reported it.
    pub locked_until: Option<Timestamp>,
}

impl ObservedGift {
    /// The lock entry this observation contributes for its account.
    ///
    /// Outer `None`: the account holds no lock. `Some(None)`: locked with an
    /// unknown expiry. `Some(Some(t))`: locked until `t` (always in the
    /// future relative to `now`).
    pub fn lock_entry(&self, now: Timestamp) -> Option<Option<Timestamp>> {
        match self.locked_until {
            Some(until) if until > now => Some(Some(until)),
            Some(_) => None,
            None if self.locked => Some(None),
            None => None,
        }
    }
}

/// Effective per-user availability of a gift.
///
/// Per-user limited gifts are bounded by both the global remaining amount and
/// the per-user remainder; everything else falls back to the global amount.
pub fn effective_per_user_available(
    available_amount: Option<i64>,
    limited_per_user: bool,
    per_user_remains: Option<i64>,
) -> Option<i64> {
    if !limited_per_user {
        return available_amount;
    }
    match (available_amount, per_user_remains) {
        (Some(available), Some(remains)) => Some(available.min(remains)),
        _ => per_user_remains,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
