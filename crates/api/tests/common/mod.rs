#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use giftpanel_api::auth::jwt::{issue_token, JwtConfig};
use giftpanel_api::config::{ServerConfig, SyncConfig};
use giftpanel_api::router::build_app_router;
use giftpanel_api::state::{AppState, EngineDeps};
use giftpanel_core::account::{AccountHandle, AccountSnapshot};
use giftpanel_core::gift::ObservedGift;
use giftpanel_core::types::DbId;
use giftpanel_sync::{LinkedAccount, MemoryStore};
use giftpanel_telegram::{
    AccountProfileFetcher, BotApiError, PremiumStatus, RemoteError, RemoteGiftFetcher,
    RemoteProfile, StickerDownloader,
};

/// The user every helper authenticates as unless told otherwise.
pub const USER: DbId = 1;

pub const LOTTIE: &[u8] = br#"{"v":"5.7.4","fr":60,"ip":0,"op":180,"layers":[]}"#;

// ---------------------------------------------------------------------------
// Remote fakes
// ---------------------------------------------------------------------------

/// Session gateway fake serving the same scripted answer to every account.
pub struct FakeGateway {
    pub gifts: Mutex<Result<Vec<ObservedGift>, RemoteError>>,
    pub profile: Mutex<Result<RemoteProfile, RemoteError>>,
    pub stars: i64,
    pub gift_calls: AtomicUsize,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            gifts: Mutex::new(Ok(vec![observed_gift("7", 3)])),
            profile: Mutex::new(Ok(RemoteProfile {
                id: Some(9001),
                username: Some("collector".into()),
                first_name: Some("Gift".into()),
                is_premium: false,
            })),
            stars: 250,
            gift_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeGateway {
    pub fn respond_gifts(&self, response: Result<Vec<ObservedGift>, RemoteError>) {
        *self.gifts.lock().unwrap() = response;
    }

    pub fn respond_profile(&self, response: Result<RemoteProfile, RemoteError>) {
        *self.profile.lock().unwrap() = response;
    }

    pub fn gift_calls(&self) -> usize {
        self.gift_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteGiftFetcher for FakeGateway {
    async fn fetch_gifts(&self, _: &AccountHandle) -> Result<Vec<ObservedGift>, RemoteError> {
        self.gift_calls.fetch_add(1, Ordering::SeqCst);
        self.gifts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountProfileFetcher for FakeGateway {
    async fn fetch_profile(&self, _: &AccountHandle) -> Result<RemoteProfile, RemoteError> {
        self.profile.lock().unwrap().clone()
    }

    async fn fetch_stars(&self, _: &AccountHandle) -> Result<i64, RemoteError> {
        Ok(self.stars)
    }

    async fn fetch_premium_status(&self, _: &AccountHandle) -> Result<PremiumStatus, RemoteError> {
        Ok(PremiumStatus::default())
    }
}

/// Bot API fake returning a fixed body, or HTTP 502 when `body` is `None`.
pub struct FakeDownloader {
    pub body: Mutex<Option<Vec<u8>>>,
    pub calls: AtomicUsize,
}

impl Default for FakeDownloader {
    fn default() -> Self {
        Self {
            body: Mutex::new(Some(tgs(LOTTIE))),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StickerDownloader for FakeDownloader {
    async fn download(&self, _token: &str, _file_id: &str) -> Result<Vec<u8>, BotApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.body
            .lock()
            .unwrap()
            .clone()
            .ok_or(BotApiError::Status { status: 502 })
    }
}

pub fn tgs(json: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json).unwrap();
    encoder.finish().unwrap()
}

pub fn observed_gift(id: &str, available: i64) -> ObservedGift {
    ObservedGift {
        id: id.to_string(),
        title: Some("Lucky Cat".into()),
        price: 25,
        supply: Some(10_000),
        is_limited: true,
        available_amount: Some(available),
        total_amount: Some(10_000),
        limited_per_user: false,
        per_user_available: Some(available),
        per_user_remains: None,
        require_premium: false,
        sticker_file_id: Some("file-7".into()),
        sticker_unique_id: Some("uniq_7".into()),
        sticker_mime: Some("application/x-tgsticker".into()),
        locked: false,
        locked_until: None,
    }
}

pub fn linked_account(user_id: DbId, account_id: DbId) -> LinkedAccount {
    LinkedAccount {
        handle: AccountHandle {
            account_id,
            user_id,
            session_ref: format!("sessions/{account_id}.session"),
            api_id: 12345,
            api_hash: "0123456789abcdef".into(),
        },
        snapshot: AccountSnapshot {
            id: account_id,
            phone: format!("+1555000{account_id}"),
            username: None,
            first_name: None,
            is_premium: false,
            premium_until: None,
            stars: 0,
            last_checked_at: None,
        },
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
        access_token_expiry_mins: 15,
        leeway_secs: 0,
    }
}

/// Build a test `ServerConfig` with safe defaults and a short poll wait.
pub fn test_config(cache_dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: jwt_config(),
        sync: SyncConfig {
            poll_wait_secs: 1,
            stage_delay_ms: 0,
            sticker_cache_dir: cache_dir.path().to_path_buf(),
            ..SyncConfig::default()
        },
    }
}

/// The full router over in-memory stores and remote fakes.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub downloader: Arc<FakeDownloader>,
    _cache_dir: TempDir,
}

/// Build the app with one linked account (id 10) for [`USER`].
///
/// Uses the same [`build_app_router`] as `main.rs`, so tests exercise the
/// production middleware stack.
pub fn build_test_app() -> TestApp {
    let cache_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.insert_account(linked_account(USER, 10));
    let gateway = Arc::new(FakeGateway::default());
    let downloader = Arc::new(FakeDownloader::default());

    let deps = EngineDeps {
        accounts: store.clone(),
        snapshots: store.clone(),
        settings: store.clone(),
        gifts: gateway.clone(),
        profiles: gateway.clone(),
        downloader: downloader.clone(),
    };
    let state = AppState::build(test_config(&cache_dir), None, deps);

    TestApp {
        router: build_app_router(state.clone()),
        state,
        store,
        gateway,
        downloader,
        _cache_dir: cache_dir,
    }
}

pub fn token_for(user_id: DbId) -> String {
    issue_token(user_id, &jwt_config()).unwrap()
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub fn authed(method: Method, uri: &str, user_id: DbId) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {}", token_for(user_id)))
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response {
    let request = authed(Method::GET, uri, USER).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_as(app: &Router, uri: &str, user_id: DbId) -> Response {
    let request = authed(Method::GET, uri, user_id).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post_as(app: &Router, uri: &str, user_id: DbId) -> Response {
    let request = authed(Method::POST, uri, user_id).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn put_json(app: &Router, uri: &str, body: serde_json::Value) -> Response {
    let request = authed(Method::PUT, uri, USER)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Parse an NDJSON body into one value per line.
pub async fn body_lines(response: Response) -> Vec<serde_json::Value> {
    let bytes = body_bytes(response).await;
    String::from_utf8(bytes)
        .unwrap()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
