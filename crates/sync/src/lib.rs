//! Gift synchronization engine.
//!
//! - [`SessionLockManager`] serializes every remote call per linked account.
//! - [`GiftCollector`] runs one pass over a user's accounts and merges the
//!   results.
//! - [`GiftSyncManager`] owns the per-user workers: single-flight manual
//!   refreshes, auto-refresh timers, change detection and publication.
//! - [`AccountRefreshStreamer`] refreshes one account's profile with staged
//!   progress records.
//! - [`StickerCacheStore`] serves decoded sticker animations.
//!
//! Persistence goes through the traits in [`store`], with PostgreSQL
//! ([`pg`]) and in-memory ([`memory`]) implementations.

pub mod account_refresh;
pub mod collector;
pub mod memory;
pub mod pg;
pub mod session_locks;
pub mod sticker_cache;
pub mod store;
pub mod worker;

pub use account_refresh::{AccountRefreshStreamer, RefreshRecord, RefreshStage};
pub use collector::{AccountFailure, CollectError, CollectOutcome, GiftCollector};
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use session_locks::{LockHolder, SessionGuard, SessionLockManager};
pub use sticker_cache::{StickerCacheStore, StickerError, StickerPayload};
pub use store::{
    AccountDirectory, LinkedAccount, SettingsStore, SnapshotStore, StoreError, StoredSnapshot,
};
pub use worker::{GiftSyncManager, PassReport, SyncError, SyncPhase, SyncStatus, WaitOutcome};
