//! Decoded sticker animation cache.
//!
//! Entries are immutable and never evicted: the content behind a sticker id
//! never changes. Decoded payloads live in memory and are persisted under
//! `<dir>/<shard>/<key>.json`, where the shard is the first two hex digits of
//! the key's SHA-256, so a restart does not re-download anything.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use giftpanel_core::error::CoreError;
use giftpanel_core::hashing::{shard_prefix, sha256_hex};
use giftpanel_core::sticker::{cache_key, decode_tgs, validate_cache_key, StickerDecodeError};
use giftpanel_core::types::DbId;
use giftpanel_telegram::{BotApiError, StickerDownloader};

use crate::store::{SettingsStore, StoreError};

/// A decoded animation ready to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerPayload {
    pub key: String,
    /// Lottie JSON bytes.
    pub json: Vec<u8>,
    /// SHA-256 of `json`, hex-encoded.
    pub etag: String,
}

impl StickerPayload {
    pub fn new(key: impl Into<String>, json: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            etag: sha256_hex(&json),
            json,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StickerError {
    #[error("sticker unique id or file id is required")]
    MissingIdentifier,

    #[error("invalid sticker key: {0}")]
    InvalidKey(CoreError),

    #[error("a file id is required to download an uncached sticker")]
    FileIdRequired,

    #[error("no bot token configured")]
    NoBotToken,

    #[error(transparent)]
    Malformed(#[from] StickerDecodeError),

    #[error(transparent)]
    DownloadFailed(#[from] BotApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A caller's handle on a key's miss gate. The last handle out removes the
/// gate from the map, whatever way the miss ended.
struct InflightGate<'a> {
    cache: &'a StickerCacheStore,
    key: &'a str,
    slot: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InflightGate<'_> {
    fn drop(&mut self) {
        let mut inflight = self.cache.inflight.lock().unwrap_or_else(|e| e.into_inner());
        let last = inflight
            .get(self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2);
        if last {
            inflight.remove(self.key);
        }
    }
}

pub struct StickerCacheStore {
    dir: PathBuf,
    settings: Arc<dyn SettingsStore>,
    downloader: Arc<dyn StickerDownloader>,
    entries: RwLock<HashMap<String, Arc<StickerPayload>>>,
    /// One gate per key with a miss in progress.
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    tmp_seq: AtomicU64,
}

impl StickerCacheStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        settings: Arc<dyn SettingsStore>,
        downloader: Arc<dyn StickerDownloader>,
    ) -> Self {
        Self {
            dir: dir.into(),
            settings,
            downloader,
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            tmp_seq: AtomicU64::new(0),
        }
    }

    /// Serve a sticker by unique id, falling back to the file id.
    ///
    /// Misses are downloaded with the user's bot token; concurrent misses
    /// for one key share a single download.
    pub async fn get(
        &self,
        user_id: DbId,
        unique_id: Option<&str>,
        file_id: Option<&str>,
    ) -> Result<Arc<StickerPayload>, StickerError> {
        let key = cache_key(unique_id, file_id).ok_or(StickerError::MissingIdentifier)?;
        validate_cache_key(key).map_err(StickerError::InvalidKey)?;

        let file_id = file_id.map(str::trim).filter(|f| !f.is_empty());
        // A payload cached under the file id can be promoted to the unique id.
        let alias = file_id.filter(|f| *f != key && validate_cache_key(f).is_ok());

        if let Some(hit) = self.lookup(key, alias).await {
            return Ok(hit);
        }

        let gate = self.gate(key);
        let _permit = gate.slot.lock().await;
        if let Some(hit) = self.lookup(key, alias).await {
            return Ok(hit);
        }

        let token = self
            .settings
            .bot_token(user_id)
            .await?
            .ok_or(StickerError::NoBotToken)?;
        let file_id = file_id.ok_or(StickerError::FileIdRequired)?;

        let raw = self.downloader.download(&token, file_id).await?;
        let json = decode_tgs(&raw).inspect_err(|e| {
            tracing::warn!(user_id, key, error = %e, "Downloaded sticker is malformed");
        })?;

        let payload = Arc::new(StickerPayload::new(key, json));
        self.persist(&payload).await;
        let payload = self.remember(payload);

        tracing::info!(user_id, key, bytes = payload.json.len(), "Sticker cached");
        Ok(payload)
    }

    /// Number of payloads held in memory.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// On-disk location of a key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(shard_prefix(key)).join(format!("{key}.json"))
    }

    // ---- private helpers ----

    async fn lookup(&self, key: &str, alias: Option<&str>) -> Option<Arc<StickerPayload>> {
        if let Some(hit) = self.cached(key) {
            return Some(hit);
        }
        if let Some(json) = self.load(key).await {
            return Some(self.remember(Arc::new(StickerPayload::new(key, json))));
        }

        let alias = alias?;
        let json = match self.cached(alias) {
            Some(hit) => hit.json.clone(),
            None => self.load(alias).await?,
        };
        tracing::debug!(key, alias, "Promoting sticker cached under its file id");
        let promoted = Arc::new(StickerPayload::new(key, json));
        self.persist(&promoted).await;
        Some(self.remember(promoted))
    }

    fn cached(&self, key: &str) -> Option<Arc<StickerPayload>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Insert unless present; the first payload stored under a key wins.
    fn remember(&self, payload: Arc<StickerPayload>) -> Arc<StickerPayload> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(entries.entry(payload.key.clone()).or_insert(payload))
    }

    fn gate<'a>(&'a self, key: &'a str) -> InflightGate<'a> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        InflightGate {
            cache: self,
            key,
            slot: Arc::clone(inflight.entry(key.to_string()).or_default()),
        }
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn load(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(json) if !json.is_empty() => Some(json),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(key, path = %path.display(), error = %e, "Failed to read cached sticker");
                None
            }
        }
    }

    /// Write via a temp file and rename. Failures are logged; the payload is
    /// still served from memory.
    async fn persist(&self, payload: &StickerPayload) {
        let path = self.path_for(&payload.key);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = write_atomic(&path, &payload.json, seq).await {
            tracing::warn!(
                key = %payload.key,
                path = %path.display(),
                error = %e,
                "Failed to persist sticker",
            );
        }
    }
}

async fn write_atomic(path: &Path, data: &[u8], seq: u64) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
    tokio::fs::write(&tmp, data).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
