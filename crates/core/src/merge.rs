//! Cross-account merge of gift observations.
//!
//! Rules:
//!
//! - Gifts are unioned by id; an id is never duplicated or reassigned.
//! - When several accounts report the same gift, the most recently observed
//!   catalog fields win (availability, supply, ...).
//! - Lock maps are unioned by account id. Each account only writes its own
//!   entry: reporting a gift without a lock clears that account's entry.
//! - Accounts listed in `retained_accounts` (transient failure this pass)
//!   keep the lock entries they held in the previous snapshot until those
//!   entries expire naturally. A previous gift nobody reported this pass is
//!   carried over while such an entry is live.
//! - Expired lock entries are pruned before the result is returned.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::gift::{Gift, ObservedGift};
use crate::types::{DbId, Timestamp};

/// The gifts one account returned during a collector pass.
#[derive(Debug, Clone)]
pub struct AccountObservation {
    pub account_id: DbId,
    /// When the fetch for this account completed.
    pub observed_at: Timestamp,
    pub gifts: Vec<ObservedGift>,
}

/// Merge per-account observations into a single gift list.
///
/// The output is sorted by `(price, id)` for presentation; change detection
/// canonicalizes independently of this order.
pub fn merge_observations(
    previous: &[Gift],
    observations: &[AccountObservation],
    retained_accounts: &BTreeSet<DbId>,
    now: Timestamp,
) -> Vec<Gift> {
    let previous_by_id: HashMap<&str, &Gift> =
        previous.iter().map(|g| (g.id.as_str(), g)).collect();

    let mut ordered: Vec<&AccountObservation> = observations.iter().collect();
    ordered.sort_by_key(|o| (o.observed_at, o.account_id));

    let mut merged: BTreeMap<String, Gift> = BTreeMap::new();
    for observation in ordered {
        for observed in &observation.gifts {
            let gift = merged
                .entry(observed.id.clone())
                .and_modify(|existing| existing.apply_observation(observed))
                .or_insert_with(|| Gift::from_observed(observed));

            match observed.lock_entry(now) {
                Some(expiry) => {
                    gift.locks.insert(observation.account_id, expiry);
                }
                None => {
                    gift.locks.remove(&observation.account_id);
                }
            }
        }
    }

    for gift in merged.values_mut() {
        if let Some(prev) = previous_by_id.get(gift.id.as_str()) {
            for (account_id, expiry) in &prev.locks {
                if retained_accounts.contains(account_id) {
                    gift.locks.entry(*account_id).or_insert(*expiry);
                }
            }
        }
        gift.prune_expired_locks(now);
    }

    // Nobody reported these this pass, but a retained account still holds a
    // live lock on them.
    for prev in previous {
        if merged.contains_key(&prev.id) {
            continue;
        }
        let mut carried = prev.clone();
        carried
            .locks
            .retain(|account_id, _| retained_accounts.contains(account_id));
        carried.prune_expired_locks(now);
        if !carried.locks.is_empty() {
            merged.insert(carried.id.clone(), carried);
        }
    }

    let mut gifts: Vec<Gift> = merged.into_values().collect();
    gifts.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.id.cmp(&b.id)));
    gifts
}
