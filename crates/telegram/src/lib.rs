//! Remote boundary for linked messaging accounts.
//!
//! Provides the capability traits the sync engine consumes, the classified
//! error taxonomy for remote failures, an HTTP client for the session
//! gateway that owns the platform sessions, and a Bot API client used to
//! download sticker files.

pub mod bot_api;
pub mod error;
pub mod fetcher;
pub mod gateway;

pub use bot_api::{BotApiClient, BotApiError, StickerDownloader};
pub use error::RemoteError;
pub use fetcher::{AccountProfileFetcher, PremiumStatus, RemoteGiftFetcher, RemoteProfile};
pub use gateway::GatewayClient;
