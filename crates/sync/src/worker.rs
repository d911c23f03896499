//! Per-user gift sync workers.
//!
//! [`GiftSyncManager`] owns one [`UserSync`] per user that has been touched
//! since startup. A user's worker is `idle` until a manual refresh or its
//! auto-refresh timer starts a pass; while a pass is `running`, further
//! refresh requests join it instead of starting another. With auto-refresh
//! enabled the worker is `scheduled` between passes, and the next pass
//! starts one interval after the previous one completed.
//!
//! After every successful pass the merged snapshot is hashed; only a changed
//! hash is saved and published on the [`GiftEventBus`]. The stored hash is
//! the last published one, so a pass whose save failed is re-evaluated and
//! republished by the next successful pass.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use giftpanel_core::change_detector;
use giftpanel_core::gift::Gift;
use giftpanel_core::types::{DbId, Timestamp};
use giftpanel_events::{GiftEvent, GiftEventBus};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::collector::{AccountFailure, CollectError, GiftCollector};
use crate::store::{SettingsStore, SnapshotStore, StoreError, StoredSnapshot};

/// Maximum time to wait for one auto-refresh task during shutdown.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of one completed pass, shared by every caller that joined it.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub gifts: Vec<Gift>,
    pub hash: String,
    /// The hash differed from the last published one.
    pub changed: bool,
    /// Subscribers that received the change event.
    pub published_to: usize,
    pub failures: Vec<AccountFailure>,
    pub removed_accounts: Vec<DbId>,
}

/// Pass failures as reported to callers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("user has no linked accounts")]
    NoAccounts,

    #[error("gift fetch failed on all {} accounts", failures.len())]
    AllAccountsFailed { failures: Vec<AccountFailure> },

    #[error("snapshot store error: {0}")]
    Store(String),

    #[error("sync pass ended without a result")]
    Interrupted,
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<CollectError> for SyncError {
    fn from(e: CollectError) -> Self {
        match e {
            CollectError::NoAccounts => Self::NoAccounts,
            CollectError::AllAccountsFailed { failures, .. } => {
                Self::AllAccountsFailed { failures }
            }
            CollectError::Store(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Running,
    Scheduled,
}

/// Worker state as exposed by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub state: SyncPhase,
    pub last_hash: Option<String>,
    pub last_polled_at: Option<Timestamp>,
    pub auto_refresh: bool,
    pub subscribers: usize,
}

/// Outcome of [`GiftSyncManager::wait_for_change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready { gifts: Vec<Gift>, hash: String },
    /// Nothing newer than the caller's hash arrived before the timeout.
    Refreshing,
}

// ---------------------------------------------------------------------------
// Worker internals
// ---------------------------------------------------------------------------

type PassResult = Result<Arc<PassReport>, SyncError>;

struct AutoRefreshTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct UserSync {
    /// Receiver of the pass currently in flight, if any.
    inflight: Mutex<Option<watch::Receiver<Option<PassResult>>>>,
    auto: Mutex<Option<AutoRefreshTask>>,
}

impl UserSync {
    fn phase(&self) -> SyncPhase {
        if self.inflight.lock().unwrap_or_else(|e| e.into_inner()).is_some() {
            return SyncPhase::Running;
        }
        let auto = self.auto.lock().unwrap_or_else(|e| e.into_inner());
        match auto.as_ref() {
            Some(task) if !task.handle.is_finished() => SyncPhase::Scheduled,
            _ => SyncPhase::Idle,
        }
    }
}

/// Publishes the pass result and clears the in-flight slot, also when the
/// pass task unwinds.
struct InflightSlot {
    worker: Arc<UserSync>,
    tx: Option<watch::Sender<Option<PassResult>>>,
}

impl InflightSlot {
    fn finish(mut self, result: PassResult) {
        let mut inflight = self.worker.inflight.lock().unwrap_or_else(|e| e.into_inner());
        *inflight = None;
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(result));
        }
    }
}

impl Drop for InflightSlot {
    fn drop(&mut self) {
        if self.tx.is_some() {
            *self.worker.inflight.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
    }
}

// ---------------------------------------------------------------------------
// GiftSyncManager
// ---------------------------------------------------------------------------

/// Registry of per-user workers.
///
/// Created once at startup and shared as `Arc<GiftSyncManager>`.
pub struct GiftSyncManager {
    users: Mutex<HashMap<DbId, Arc<UserSync>>>,
    collector: Arc<GiftCollector>,
    snapshots: Arc<dyn SnapshotStore>,
    settings: Arc<dyn SettingsStore>,
    bus: Arc<GiftEventBus>,
    auto_refresh_interval: Duration,
    /// Master token; every auto-refresh task runs on a child of it.
    cancel: CancellationToken,
}

impl GiftSyncManager {
    pub fn new(
        collector: Arc<GiftCollector>,
        snapshots: Arc<dyn SnapshotStore>,
        settings: Arc<dyn SettingsStore>,
        bus: Arc<GiftEventBus>,
        auto_refresh_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            users: Mutex::new(HashMap::new()),
            collector,
            snapshots,
            settings,
            bus,
            auto_refresh_interval,
            cancel: CancellationToken::new(),
        })
    }

    pub fn bus(&self) -> &Arc<GiftEventBus> {
        &self.bus
    }

    /// Run a pass for the user, or join the one already in flight.
    ///
    /// The pass runs on its own task: dropping the returned future does not
    /// cancel it.
    pub async fn refresh(self: &Arc<Self>, user_id: DbId) -> PassResult {
        let worker = self.worker(user_id);
        let mut rx = {
            let mut inflight = worker.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match inflight.as_ref() {
                Some(rx) => {
                    tracing::debug!(user_id, "Joining in-flight gift sync pass");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    *inflight = Some(rx.clone());
                    let slot = InflightSlot {
                        worker: Arc::clone(&worker),
                        tx: Some(tx),
                    };
                    let manager = Arc::clone(self);
                    tokio::spawn(async move {
                        let result = manager.run_pass(user_id).await;
                        slot.finish(result);
                    });
                    rx
                }
            }
        };

        let result = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        result.unwrap_or(Err(SyncError::Interrupted))
    }

    /// Persist the auto-refresh flag, then start or stop the user's timer.
    ///
    /// Disabling stops the timer only; a pass already in flight completes.
    pub async fn set_auto_refresh(
        self: &Arc<Self>,
        user_id: DbId,
        enabled: bool,
    ) -> Result<(), SyncError> {
        self.settings.set_auto_refresh(user_id, enabled).await?;
        if enabled {
            self.start_auto_refresh(user_id);
        } else {
            self.stop_auto_refresh(user_id);
        }
        Ok(())
    }

    /// Start timers for every user whose auto-refresh flag is set.
    ///
    /// Returns the number of timers started.
    pub async fn resume_auto_refresh(self: &Arc<Self>) -> Result<usize, SyncError> {
        let users = self.settings.auto_refresh_users().await?;
        let started = users
            .into_iter()
            .filter(|user_id| self.start_auto_refresh(*user_id))
            .count();
        tracing::info!(count = started, "Resumed gift auto-refresh workers");
        Ok(started)
    }

    pub async fn status(&self, user_id: DbId) -> Result<SyncStatus, SyncError> {
        let stored = self.snapshot(user_id).await?;
        let auto_refresh = self.settings.auto_refresh(user_id).await?;
        let state = self
            .existing_worker(user_id)
            .map_or(SyncPhase::Idle, |worker| worker.phase());

        Ok(SyncStatus {
            state,
            last_hash: stored.hash,
            last_polled_at: stored.last_polled_at,
            auto_refresh,
            subscribers: self.bus.subscriber_count(user_id),
        })
    }

    /// The stored snapshot, empty if the user was never synced.
    pub async fn snapshot(&self, user_id: DbId) -> Result<StoredSnapshot, SyncError> {
        Ok(self.snapshots.load(user_id).await?.unwrap_or_default())
    }

    /// Return the current snapshot if its hash differs from `since`,
    /// otherwise wait up to `timeout` for the next publish.
    pub async fn wait_for_change(
        &self,
        user_id: DbId,
        since: Option<&str>,
        timeout: Duration,
    ) -> Result<WaitOutcome, SyncError> {
        // Subscribe before reading so a publish in between is not missed.
        let mut subscription = self.bus.subscribe(user_id);

        let current = self.snapshot(user_id).await?;
        if let Some(hash) = current.hash {
            if since != Some(hash.as_str()) {
                return Ok(WaitOutcome::Ready {
                    gifts: current.gifts,
                    hash,
                });
            }
        }

        match tokio::time::timeout(timeout, subscription.recv()).await {
            Ok(Ok(event)) => Ok(WaitOutcome::Ready {
                gifts: event.payload.clone(),
                hash: event.hash.clone(),
            }),
            Ok(Err(_)) | Err(_) => Ok(WaitOutcome::Refreshing),
        }
    }

    /// Cancel every auto-refresh timer and wait for the tasks to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down gift sync manager");
        self.cancel.cancel();

        let workers: Vec<(DbId, Arc<UserSync>)> = self
            .users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();

        for (user_id, worker) in workers {
            let task = worker.auto.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(task) = task {
                tracing::info!(user_id, "Stopping gift auto-refresh task");
                task.cancel.cancel();
                let _ = tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, task.handle).await;
            }
        }

        tracing::info!("Gift sync manager shut down complete");
    }

    // ---- private helpers ----

    fn worker(&self, user_id: DbId) -> Arc<UserSync> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(users.entry(user_id).or_default())
    }

    fn existing_worker(&self, user_id: DbId) -> Option<Arc<UserSync>> {
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .cloned()
    }

    /// Returns false if a timer was already running.
    fn start_auto_refresh(self: &Arc<Self>, user_id: DbId) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let worker = self.worker(user_id);
        let mut auto = worker.auto.lock().unwrap_or_else(|e| e.into_inner());
        if auto.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return false;
        }

        let cancel = self.cancel.child_token();
        let handle = tokio::spawn(Arc::clone(self).auto_refresh_loop(user_id, cancel.clone()));
        *auto = Some(AutoRefreshTask { cancel, handle });

        tracing::info!(
            user_id,
            interval_secs = self.auto_refresh_interval.as_secs(),
            "Gift auto-refresh started",
        );
        true
    }

    fn stop_auto_refresh(&self, user_id: DbId) -> bool {
        let Some(worker) = self.existing_worker(user_id) else {
            return false;
        };
        let task = worker.auto.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(worker);

        let stopped = match task {
            Some(task) => {
                task.cancel.cancel();
                tracing::info!(user_id, "Gift auto-refresh stopped");
                true
            }
            None => false,
        };
        self.release_if_idle(user_id);
        stopped
    }

    /// Forget the user's worker when nothing references it: no pass in
    /// flight, no caller waiting, no timer.
    fn release_if_idle(&self, user_id: DbId) {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let idle = users.get(&user_id).is_some_and(|worker| {
            Arc::strong_count(worker) == 1
                && worker.inflight.lock().unwrap_or_else(|e| e.into_inner()).is_none()
                && worker.auto.lock().unwrap_or_else(|e| e.into_inner()).is_none()
        });
        if idle {
            users.remove(&user_id);
            tracing::debug!(user_id, "Released idle gift sync worker");
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.users.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn auto_refresh_loop(self: Arc<Self>, user_id: DbId, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.refresh(user_id) => {
                    if let Err(e) = result {
                        tracing::debug!(user_id, error = %e, "Auto-refresh pass failed");
                    }
                }
            }

            // The interval counts from completion of the previous pass.
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.auto_refresh_interval) => {}
            }
        }
        tracing::debug!(user_id, "Gift auto-refresh loop exited");
    }

    async fn run_pass(&self, user_id: DbId) -> PassResult {
        let previous = self.snapshots.load(user_id).await.map_err(|e| {
            tracing::error!(user_id, error = %e, "Failed to load gift snapshot");
            SyncError::from(e)
        })?;
        let previous = previous.unwrap_or_default();

        let outcome = self.collector.collect(user_id, &previous.gifts).await;
        let polled_at = Utc::now();

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Gift sync pass failed");
                self.record_poll(user_id, polled_at).await;
                return Err(e.into());
            }
        };

        let hash = change_detector::digest(&outcome.gifts);
        let changed = change_detector::has_changed(previous.hash.as_deref(), &hash);
        let mut published_to = 0;

        if changed {
            let stored = StoredSnapshot {
                gifts: outcome.gifts.clone(),
                hash: Some(hash.clone()),
                last_polled_at: Some(polled_at),
            };
            if let Err(e) = self.snapshots.save(user_id, &stored).await {
                tracing::error!(user_id, hash = %hash, error = %e, "Failed to save gift snapshot");
                self.record_poll(user_id, polled_at).await;
                return Err(e.into());
            }

            published_to = self
                .bus
                .publish(user_id, GiftEvent::gifts(outcome.gifts.clone(), hash.clone()));
            tracing::info!(
                user_id,
                hash = %hash,
                count = outcome.gifts.len(),
                subscribers = published_to,
                "Gift snapshot published",
            );
        } else {
            self.record_poll(user_id, polled_at).await;
            tracing::debug!(user_id, hash = %hash, "Gift snapshot unchanged");
        }

        Ok(Arc::new(PassReport {
            gifts: outcome.gifts,
            hash,
            changed,
            published_to,
            failures: outcome.failures,
            removed_accounts: outcome.removed_accounts,
        }))
    }

    async fn record_poll(&self, user_id: DbId, polled_at: Timestamp) {
        if let Err(e) = self.snapshots.record_poll(user_id, polled_at).await {
            tracing::error!(user_id, error = %e, "Failed to record gift poll time");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
