use std::sync::Arc;

use giftpanel_events::GiftEventBus;
use giftpanel_sync::{
    AccountDirectory, AccountRefreshStreamer, GiftCollector, GiftSyncManager, SessionLockManager,
    SettingsStore, SnapshotStore, StickerCacheStore,
};
use giftpanel_telegram::{AccountProfileFetcher, RemoteGiftFetcher, StickerDownloader};

use crate::auth::jwt::TokenVerifier;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database pool, absent when running on in-memory stores.
    pub pool: Option<giftpanel_db::DbPool>,
    pub config: Arc<ServerConfig>,
    pub tokens: TokenVerifier,
    pub sync: Arc<GiftSyncManager>,
    pub account_refresh: Arc<AccountRefreshStreamer>,
    pub stickers: Arc<StickerCacheStore>,
}

/// Storage and remote collaborators the engine is built from.
pub struct EngineDeps {
    pub accounts: Arc<dyn AccountDirectory>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub gifts: Arc<dyn RemoteGiftFetcher>,
    pub profiles: Arc<dyn AccountProfileFetcher>,
    pub downloader: Arc<dyn StickerDownloader>,
}

impl AppState {
    /// Wire the engine: one session lock registry shared by the collector
    /// and the account refresh streamer, one event bus for all users.
    pub fn build(config: ServerConfig, pool: Option<giftpanel_db::DbPool>, deps: EngineDeps) -> Self {
        let sync_config = &config.sync;
        let locks = Arc::new(SessionLockManager::new());
        let bus = Arc::new(GiftEventBus::new(sync_config.subscriber_buffer));

        let collector = Arc::new(GiftCollector::new(
            Arc::clone(&deps.accounts),
            deps.gifts,
            Arc::clone(&locks),
            sync_config.rate_limit_backoff(),
        ));
        let sync = GiftSyncManager::new(
            collector,
            deps.snapshots,
            Arc::clone(&deps.settings),
            bus,
            sync_config.auto_refresh_interval(),
        );
        let account_refresh = Arc::new(AccountRefreshStreamer::new(
            deps.accounts,
            deps.profiles,
            locks,
            sync_config.stage_delay(),
        ));
        let stickers = Arc::new(StickerCacheStore::new(
            sync_config.sticker_cache_dir.clone(),
            deps.settings,
            deps.downloader,
        ));

        Self {
            pool,
            tokens: TokenVerifier::new(&config.jwt),
            config: Arc::new(config),
            sync,
            account_refresh,
            stickers,
        }
    }
}
