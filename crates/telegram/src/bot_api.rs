//! Bot API file download used to populate the sticker cache.
//!
//! Sticker files are only reachable through the Bot API, which needs a bot
//! token configured separately from the linked accounts. Both URLs embed the
//! token, so every error is stripped of its URL before it leaves this module.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// Downloads a raw sticker file by its platform file id.
#[async_trait]
pub trait StickerDownloader: Send + Sync {
    async fn download(&self, bot_token: &str, file_id: &str) -> Result<Vec<u8>, BotApiError>;
}

/// Errors from the Bot API download path.
#[derive(Debug, thiserror::Error)]
pub enum BotApiError {
    /// Transport failure (connect, TLS, timeout, body read).
    #[error("Bot API request failed: {0}")]
    Request(String),

    /// Non-2xx status from either call.
    #[error("Bot API returned HTTP {status}")]
    Status { status: u16 },

    /// `getFile` answered `ok=false` or without a `file_path`.
    #[error("Bot API getFile rejected: {0}")]
    FileUnavailable(String),
}

impl From<reqwest::Error> for BotApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.without_url().to_string())
    }
}

#[derive(Deserialize)]
struct GetFileResponse {
    ok: bool,
    #[serde(default)]
    result: Option<FileResult>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct FileResult {
    #[serde(default)]
    file_path: Option<String>,
}

/// HTTP client for the Bot API.
pub struct BotApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl BotApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn resolve_file_path(&self, token: &str, file_id: &str) -> Result<String, BotApiError> {
        let response = self
            .client
            .get(format!("{}/bot{token}/getFile", self.base_url))
            .query(&[("file_id", file_id)])
            .send()
            .await?;

        let status = response.status();
        let body: Option<GetFileResponse> = response.json().await.ok();
        match body {
            Some(GetFileResponse {
                ok: true,
                result: Some(FileResult {
                    file_path: Some(path),
                }),
                ..
            }) if !path.is_empty() => Ok(path),
            Some(body) => Err(BotApiError::FileUnavailable(
                body.description
                    .unwrap_or_else(|| "missing file_path".to_string()),
            )),
            None if !status.is_success() => Err(BotApiError::Status {
                status: status.as_u16(),
            }),
            None => Err(BotApiError::FileUnavailable("unreadable response".to_string())),
        }
    }
}

#[async_trait]
impl StickerDownloader for BotApiClient {
    async fn download(&self, bot_token: &str, file_id: &str) -> Result<Vec<u8>, BotApiError> {
        let file_path = self.resolve_file_path(bot_token, file_id).await?;

        let response = self
            .client
            .get(format!("{}/file/bot{bot_token}/{file_path}", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotApiError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        tracing::debug!(file_id, size = bytes.len(), "Downloaded sticker file");
        Ok(bytes.to_vec())
    }
}
