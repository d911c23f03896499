//! Multi-account gift collection.
//!
//! One [`GiftCollector::collect`] call is one pass: walk the user's accounts
//! in id order, fetch each account's gift listing under its session lock,
//! then merge everything into a single snapshot. Per-account failures are
//! isolated; they never abort the merge of the other accounts.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use giftpanel_core::gift::Gift;
use giftpanel_core::merge::{merge_observations, AccountObservation};
use giftpanel_core::types::DbId;
use giftpanel_telegram::{RemoteError, RemoteGiftFetcher};
use tokio::time::Instant;

use crate::session_locks::SessionLockManager;
use crate::store::{AccountDirectory, StoreError};

/// Lock holder label used by collector passes.
pub const COLLECTOR_HOLDER: &str = "gift-collector";

/// One account's failure during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFailure {
    pub account_id: DbId,
    pub error: RemoteError,
    /// The account was skipped because an earlier rate limit has not elapsed.
    pub skipped: bool,
}

/// The result of a successful pass.
#[derive(Debug, Clone)]
pub struct CollectOutcome {
    pub gifts: Vec<Gift>,
    pub failures: Vec<AccountFailure>,
    /// Accounts removed because their session was revoked.
    pub removed_accounts: Vec<DbId>,
    /// Accounts whose listing made it into the merge.
    pub observed_accounts: Vec<DbId>,
}

/// Pass-level failures.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("user has no linked accounts")]
    NoAccounts,

    #[error("all {} accounts failed", failures.len())]
    AllAccountsFailed {
        failures: Vec<AccountFailure>,
        removed_accounts: Vec<DbId>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs collector passes and remembers per-account rate-limit backoffs.
pub struct GiftCollector {
    accounts: Arc<dyn AccountDirectory>,
    fetcher: Arc<dyn RemoteGiftFetcher>,
    locks: Arc<SessionLockManager>,
    default_backoff: Duration,
    backoff_until: Mutex<HashMap<(DbId, DbId), Instant>>,
}

impl GiftCollector {
    /// `default_backoff` applies when a rate-limit error carries no hint.
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        fetcher: Arc<dyn RemoteGiftFetcher>,
        locks: Arc<SessionLockManager>,
        default_backoff: Duration,
    ) -> Self {
        Self {
            accounts,
            fetcher,
            locks,
            default_backoff,
            backoff_until: Mutex::new(HashMap::new()),
        }
    }

    /// Run one pass for `user_id`, merging onto `previous`.
    ///
    /// `previous` only contributes lock entries of accounts that failed
    /// transiently this pass, along with the gifts those entries sit on.
    pub async fn collect(
        &self,
        user_id: DbId,
        previous: &[Gift],
    ) -> Result<CollectOutcome, CollectError> {
        let mut accounts = self.accounts.list_accounts(user_id).await?;
        if accounts.is_empty() {
            return Err(CollectError::NoAccounts);
        }
        accounts.sort_by_key(|a| a.id());

        let mut observations = Vec::with_capacity(accounts.len());
        let mut failures = Vec::new();
        let mut removed_accounts = Vec::new();
        let mut retained = BTreeSet::new();

        for account in &accounts {
            let account_id = account.id();

            if let Some(remaining) = self.backoff_remaining(user_id, account_id) {
                tracing::debug!(
                    user_id,
                    account_id,
                    remaining_ms = remaining.as_millis() as u64,
                    "Skipping rate-limited account",
                );
                retained.insert(account_id);
                failures.push(AccountFailure {
                    account_id,
                    error: RemoteError::RateLimited {
                        retry_after: Some(remaining),
                    },
                    skipped: true,
                });
                continue;
            }

            let result = {
                let _guard = self.locks.acquire(user_id, account_id, COLLECTOR_HOLDER).await;
                self.fetcher.fetch_gifts(&account.handle).await
            };

            match result {
                Ok(gifts) => {
                    tracing::debug!(user_id, account_id, count = gifts.len(), "Account gifts fetched");
                    observations.push(AccountObservation {
                        account_id,
                        observed_at: Utc::now(),
                        gifts,
                    });
                }
                Err(error) => {
                    self.handle_failure(user_id, account_id, &error, &mut retained, &mut removed_accounts)
                        .await;
                    failures.push(AccountFailure {
                        account_id,
                        error,
                        skipped: false,
                    });
                }
            }
        }

        if observations.is_empty() {
            return Err(CollectError::AllAccountsFailed {
                failures,
                removed_accounts,
            });
        }

        let gifts = merge_observations(previous, &observations, &retained, Utc::now());
        Ok(CollectOutcome {
            gifts,
            failures,
            removed_accounts,
            observed_accounts: observations.iter().map(|o| o.account_id).collect(),
        })
    }

    async fn handle_failure(
        &self,
        user_id: DbId,
        account_id: DbId,
        error: &RemoteError,
        retained: &mut BTreeSet<DbId>,
        removed: &mut Vec<DbId>,
    ) {
        match error {
            RemoteError::SessionInvalid { code } => {
                tracing::warn!(user_id, account_id, code = %code, "Account session invalid, removing");
                match self.accounts.remove_account(user_id, account_id).await {
                    Ok(_) => {
                        tracing::info!(user_id, account_id, "Account removed");
                        removed.push(account_id);
                    }
                    Err(e) => {
                        tracing::error!(user_id, account_id, error = %e, "Failed to remove account");
                    }
                }
                self.clear_backoff(user_id, account_id);
            }
            RemoteError::RateLimited { retry_after } => {
                let wait = retry_after.unwrap_or(self.default_backoff);
                tracing::warn!(
                    user_id,
                    account_id,
                    backoff_secs = wait.as_secs(),
                    "Account rate limited, backing off",
                );
                self.backoff_until
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert((user_id, account_id), Instant::now() + wait);
                retained.insert(account_id);
            }
            other => {
                tracing::warn!(user_id, account_id, error = %other, "Account gift fetch failed");
                retained.insert(account_id);
            }
        }
    }

    fn backoff_remaining(&self, user_id: DbId, account_id: DbId) -> Option<Duration> {
        let mut backoffs = self.backoff_until.lock().unwrap_or_else(|e| e.into_inner());
        let until = *backoffs.get(&(user_id, account_id))?;
        let now = Instant::now();
        if until > now {
            Some(until - now)
        } else {
            backoffs.remove(&(user_id, account_id));
            None
        }
    }

    fn clear_backoff(&self, user_id: DbId, account_id: DbId) {
        self.backoff_until
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(user_id, account_id));
    }
}
