//! Single-account profile refresh with staged progress.
//!
//! A refresh walks `connect -> profile -> stars -> premium -> save` and
//! emits one [`RefreshRecord`] per stage, then a terminal `done` or error
//! record. The stream is consumed as newline-delimited JSON by the accounts
//! endpoint. Remote calls run under the account's session lock, shared with
//! the gift collector.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use giftpanel_core::account::{AccountSnapshot, ProfileUpdate};
use giftpanel_core::premium::extract_premium_until;
use giftpanel_core::types::DbId;
use giftpanel_telegram::{AccountProfileFetcher, RemoteError};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::session_locks::SessionLockManager;
use crate::store::{AccountDirectory, LinkedAccount, StoreError};

/// Lock holder label used by single-account refreshes.
pub const REFRESH_HOLDER: &str = "account-refresh";

const RECORD_BUFFER: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStage {
    Connect,
    Profile,
    Stars,
    Premium,
    Save,
}

impl RefreshStage {
    pub fn message(self) -> &'static str {
        match self {
            Self::Connect => "Connecting…",
            Self::Profile => "Checking profile…",
            Self::Stars => "Checking stars…",
            Self::Premium => "Checking premium…",
            Self::Save => "Saving…",
        }
    }
}

/// One progress record. Serialized without a tag; the shape tells the
/// records apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RefreshRecord {
    Stage {
        stage: RefreshStage,
        message: String,
    },
    Done {
        done: bool,
        message: String,
        account: AccountSnapshot,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl RefreshRecord {
    fn stage(stage: RefreshStage) -> Self {
        Self::Stage {
            stage,
            message: stage.message().to_string(),
        }
    }

    fn done(account: AccountSnapshot) -> Self {
        Self::Done {
            done: true,
            message: "Done".to_string(),
            account,
        }
    }

    fn error(error: &str, error_code: Option<&str>, detail: Option<String>) -> Self {
        Self::Error {
            error: error.to_string(),
            error_code: error_code.map(str::to_string),
            detail,
        }
    }

    /// `true` for the `done` and error records.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Stage { .. })
    }
}

/// Why a refresh stopped before `done`.
enum Abort {
    /// The consumer went away.
    Closed,
    Remote(RemoteError),
    Store(StoreError),
    /// The account disappeared between lookup and save.
    Gone,
}

pub struct AccountRefreshStreamer {
    accounts: Arc<dyn AccountDirectory>,
    profiles: Arc<dyn AccountProfileFetcher>,
    locks: Arc<SessionLockManager>,
    /// Pause after each stage record so clients can render progress.
    stage_delay: Duration,
}

impl AccountRefreshStreamer {
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        profiles: Arc<dyn AccountProfileFetcher>,
        locks: Arc<SessionLockManager>,
        stage_delay: Duration,
    ) -> Self {
        Self {
            accounts,
            profiles,
            locks,
            stage_delay,
        }
    }

    /// Start a refresh on its own task and return its record stream.
    ///
    /// Dropping the receiver stops the refresh at the next stage boundary.
    pub fn start(self: &Arc<Self>, user_id: DbId, account_id: DbId) -> mpsc::Receiver<RefreshRecord> {
        let (tx, rx) = mpsc::channel(RECORD_BUFFER);
        let streamer = Arc::clone(self);
        tokio::spawn(async move {
            streamer.run(user_id, account_id, tx).await;
        });
        rx
    }

    async fn run(&self, user_id: DbId, account_id: DbId, tx: mpsc::Sender<RefreshRecord>) {
        let account = match self.accounts.find_account(user_id, account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                let _ = tx.send(RefreshRecord::error("account_not_found", None, None)).await;
                return;
            }
            Err(e) => {
                tracing::error!(user_id, account_id, error = %e, "Failed to load account");
                let _ = tx
                    .send(RefreshRecord::error("refresh_failed", None, Some(e.to_string())))
                    .await;
                return;
            }
        };

        tracing::info!(user_id, account_id, "Account refresh started");

        let terminal = match self.stages(&account, &tx).await {
            Ok(snapshot) => {
                tracing::info!(user_id, account_id, stars = snapshot.stars, "Account refreshed");
                RefreshRecord::done(snapshot)
            }
            Err(Abort::Closed) => {
                tracing::debug!(user_id, account_id, "Account refresh consumer went away");
                return;
            }
            Err(Abort::Remote(RemoteError::SessionInvalid { code })) => {
                tracing::warn!(user_id, account_id, code = %code, "Account session invalid, removing");
                if let Err(e) = self.accounts.remove_account(user_id, account_id).await {
                    tracing::error!(user_id, account_id, error = %e, "Failed to remove account");
                }
                RefreshRecord::error(
                    "session_invalid",
                    Some(&code),
                    Some("Session is no longer valid; the account was removed".to_string()),
                )
            }
            Err(Abort::Remote(e)) => {
                tracing::warn!(user_id, account_id, error = %e, "Account refresh failed");
                RefreshRecord::error("refresh_failed", Some(e.code()), Some(e.to_string()))
            }
            Err(Abort::Store(e)) => {
                tracing::error!(user_id, account_id, error = %e, "Failed to save account profile");
                RefreshRecord::error("refresh_failed", None, Some(e.to_string()))
            }
            Err(Abort::Gone) => RefreshRecord::error("account_not_found", None, None),
        };

        let _ = tx.send(terminal).await;
    }

    async fn stages(
        &self,
        account: &LinkedAccount,
        tx: &mpsc::Sender<RefreshRecord>,
    ) -> Result<AccountSnapshot, Abort> {
        let handle = &account.handle;

        self.emit(tx, RefreshStage::Connect).await?;
        let _guard = self
            .locks
            .acquire(handle.user_id, handle.account_id, REFRESH_HOLDER)
            .await;

        self.emit(tx, RefreshStage::Profile).await?;
        let profile = self.profiles.fetch_profile(handle).await.map_err(Abort::Remote)?;

        self.emit(tx, RefreshStage::Stars).await?;
        let stars = self.profiles.fetch_stars(handle).await.map_err(Abort::Remote)?;

        self.emit(tx, RefreshStage::Premium).await?;
        let premium_until = if profile.is_premium {
            match self.profiles.fetch_premium_status(handle).await {
                Ok(status) => status.status_text.as_deref().and_then(extract_premium_until),
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        user_id = handle.user_id,
                        account_id = handle.account_id,
                        error = %e,
                        "Premium status unavailable, keeping refresh",
                    );
                    None
                }
                Err(e) => return Err(Abort::Remote(e)),
            }
        } else {
            None
        };

        self.emit(tx, RefreshStage::Save).await?;
        let update = ProfileUpdate {
            username: profile.username,
            first_name: profile.first_name,
            is_premium: profile.is_premium,
            premium_until,
            stars,
            checked_at: Utc::now(),
        };
        self.accounts
            .save_profile(handle.user_id, handle.account_id, &update)
            .await
            .map_err(Abort::Store)?
            .ok_or(Abort::Gone)
    }

    async fn emit(&self, tx: &mpsc::Sender<RefreshRecord>, stage: RefreshStage) -> Result<(), Abort> {
        tx.send(RefreshRecord::stage(stage))
            .await
            .map_err(|_| Abort::Closed)?;
        if !self.stage_delay.is_zero() {
            tokio::time::sleep(self.stage_delay).await;
        }
        Ok(())
    }
}
