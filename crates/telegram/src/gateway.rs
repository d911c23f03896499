//! HTTP client for the session gateway.
//!
//! The gateway owns the platform sessions (MTProto state, session files)
//! and exposes one JSON endpoint per remote operation. Every request names
//! the account by its session reference plus API credentials; failures come
//! back as `{"error": {"code", "retry_after", "message"}}` and are
//! classified with [`RemoteError::from_rpc_code`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use giftpanel_core::account::AccountHandle;
use giftpanel_core::gift::{effective_per_user_available, ObservedGift};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::fetcher::{AccountProfileFetcher, PremiumStatus, RemoteGiftFetcher, RemoteProfile};

/// HTTP client for the session gateway.
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    session: &'a str,
    api_id: i64,
    api_hash: &'a str,
}

impl<'a> From<&'a AccountHandle> for SessionRequest<'a> {
    fn from(handle: &'a AccountHandle) -> Self {
        Self {
            session: &handle.session_ref,
            api_id: handle.api_id,
            api_hash: &handle.api_hash,
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: GatewayError,
}

#[derive(Deserialize)]
struct GatewayError {
    code: String,
    #[serde(default)]
    retry_after: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct GiftsResponse {
    /// Decoded per entry so one bad gift does not sink the listing.
    #[serde(default)]
    gifts: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct StarsResponse {
    balance: i64,
}

impl GatewayClient {
    /// Create a client for the gateway at `base_url` with a per-request
    /// timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        account: &AccountHandle,
    ) -> Result<T, RemoteError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&SessionRequest::from(account))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => RemoteError::from_rpc_code(
                &envelope.error.code,
                envelope.error.retry_after,
                envelope.error.message.as_deref().unwrap_or_default(),
            ),
            Err(_) if status.is_server_error() => {
                RemoteError::TransientNetwork(format!("gateway returned {status}"))
            }
            Err(_) => RemoteError::Unexpected(format!("gateway returned {status}")),
        })
    }
}

#[async_trait]
impl RemoteGiftFetcher for GatewayClient {
    async fn fetch_gifts(&self, account: &AccountHandle) -> Result<Vec<ObservedGift>, RemoteError> {
        let response: GiftsResponse = self.call("/v1/gifts", account).await?;
        Ok(decode_gifts(account, response.gifts))
    }
}

#[async_trait]
impl AccountProfileFetcher for GatewayClient {
    async fn fetch_profile(&self, account: &AccountHandle) -> Result<RemoteProfile, RemoteError> {
        self.call("/v1/me", account).await
    }

    async fn fetch_stars(&self, account: &AccountHandle) -> Result<i64, RemoteError> {
        let response: StarsResponse = self.call("/v1/stars", account).await?;
        Ok(response.balance)
    }

    async fn fetch_premium_status(
        &self,
        account: &AccountHandle,
    ) -> Result<PremiumStatus, RemoteError> {
        self.call("/v1/premium", account).await
    }
}

// ---------------------------------------------------------------------------
// Raw gift normalization
// ---------------------------------------------------------------------------

/// A gift as the gateway reports it: close to the platform's own shape,
/// with loosely typed ids and lock dates.
#[derive(Debug, Deserialize)]
pub struct RawGift {
    pub id: serde_json::Value,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub supply: Option<i64>,
    #[serde(default)]
    pub is_limited: bool,
    #[serde(default)]
    pub available_amount: Option<i64>,
    #[serde(default)]
    pub total_amount: Option<i64>,
    #[serde(default)]
    pub limited_per_user: bool,
    #[serde(default)]
    pub per_user_remains: Option<i64>,
    #[serde(default)]
    pub require_premium: bool,
    #[serde(default)]
    pub locked: bool,
    /// RFC 3339 string or unix seconds.
    #[serde(default)]
    pub locked_until_date: Option<serde_json::Value>,
    #[serde(default)]
    pub sticker: Option<RawSticker>,
}

#[derive(Debug, Deserialize)]
pub struct RawSticker {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub file_unique_id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl RawGift {
    /// Convert into the engine's observation type.
    ///
    /// `available_amount` only counts for limited gifts and
    /// `per_user_remains` only for per-user limited ones.
    pub fn normalize(self) -> ObservedGift {
        let available_amount = self.available_amount.filter(|_| self.is_limited);
        let per_user_remains = self.per_user_remains.filter(|_| self.limited_per_user);
        let locked_until = self.locked_until_date.as_ref().and_then(parse_lock_date);
        let (sticker_file_id, sticker_unique_id, sticker_mime) = match self.sticker {
            Some(s) => (s.file_id, s.file_unique_id, s.mime_type),
            None => (None, None, None),
        };

        ObservedGift {
            id: id_to_string(&self.id),
            title: self.title,
            price: self.price,
            supply: self.supply.or(self.total_amount),
            is_limited: self.is_limited,
            available_amount,
            total_amount: self.total_amount,
            limited_per_user: self.limited_per_user,
            per_user_available: effective_per_user_available(
                available_amount,
                self.limited_per_user,
                per_user_remains,
            ),
            per_user_remains,
            require_premium: self.require_premium,
            sticker_file_id,
            sticker_unique_id,
            sticker_mime,
            locked: self.locked || locked_until.is_some(),
            locked_until,
        }
    }
}

/// Normalize every well-formed entry; malformed ones are logged and skipped.
fn decode_gifts(account: &AccountHandle, entries: Vec<serde_json::Value>) -> Vec<ObservedGift> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let gift_id = entry.get("id").map(id_to_string);
            match serde_json::from_value::<RawGift>(entry) {
                Ok(raw) => Some(raw.normalize()),
                Err(e) => {
                    tracing::warn!(
                        account_id = account.account_id,
                        gift_id = gift_id.as_deref().unwrap_or("-"),
                        error = %e,
                        "Skipping malformed gift entry",
                    );
                    None
                }
            }
        })
        .collect()
}

fn id_to_string(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn parse_lock_date(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}
