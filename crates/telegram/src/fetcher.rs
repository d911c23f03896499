//! Capability traits consumed by the sync engine.
//!
//! The engine only ever talks to linked accounts through these traits, so
//! tests can swap in scripted fakes and the transport can change without
//! touching the collector or the refresh streamer.

use async_trait::async_trait;
use giftpanel_core::account::AccountHandle;
use giftpanel_core::gift::ObservedGift;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Lists the gift catalog as seen by one account.
#[async_trait]
pub trait RemoteGiftFetcher: Send + Sync {
    async fn fetch_gifts(&self, account: &AccountHandle) -> Result<Vec<ObservedGift>, RemoteError>;
}

/// Reads the profile and balance fields of one account.
#[async_trait]
pub trait AccountProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, account: &AccountHandle) -> Result<RemoteProfile, RemoteError>;

    async fn fetch_stars(&self, account: &AccountHandle) -> Result<i64, RemoteError>;

    async fn fetch_premium_status(
        &self,
        account: &AccountHandle,
    ) -> Result<PremiumStatus, RemoteError>;
}

/// Profile fields of the account's own user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProfile {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
}

/// Premium promo status. `status_text` is localized prose containing the
/// expiry date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumStatus {
    #[serde(default)]
    pub status_text: Option<String>,
}
