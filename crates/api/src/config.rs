use std::path::PathBuf;
use std::time::Duration;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound for post-shutdown cleanup in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub sync: SyncConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_parse("SHUTDOWN_TIMEOUT_SECS", 30),
            jwt: JwtConfig::from_env(),
            sync: SyncConfig::from_env(),
        }
    }
}

/// Gift sync engine and remote client settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay between the end of one auto pass and the start of the next.
    pub auto_refresh_interval_secs: u64,
    /// Backoff applied when a rate limit carries no retry hint.
    pub rate_limit_backoff_secs: u64,
    /// Bound for the poll-with-wait endpoint.
    pub poll_wait_secs: u64,
    /// Per-subscriber buffer before a live subscriber is disconnected.
    pub subscriber_buffer: usize,
    /// Pause after each account refresh progress record.
    pub stage_delay_ms: u64,
    pub sticker_cache_dir: PathBuf,
    pub gateway_url: String,
    pub bot_api_url: String,
    pub remote_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_refresh_interval_secs: 30,
            rate_limit_backoff_secs: 30,
            poll_wait_secs: 25,
            subscriber_buffer: giftpanel_events::bus::DEFAULT_SUBSCRIBER_BUFFER,
            stage_delay_ms: 500,
            sticker_cache_dir: PathBuf::from("gifts_cache"),
            gateway_url: "http://127.0.0.1:8081".into(),
            bot_api_url: "https://api.telegram.org".into(),
            remote_timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    /// Load engine settings from environment variables with defaults.
    ///
    /// | Env Var                            | Default                    |
    /// |------------------------------------|----------------------------|
    /// | `GIFTS_AUTO_REFRESH_INTERVAL_SECS` | `30`                       |
    /// | `GIFTS_RATE_LIMIT_BACKOFF_SECS`    | `30`                       |
    /// | `GIFTS_POLL_WAIT_SECS`             | `25`                       |
    /// | `GIFTS_SUBSCRIBER_BUFFER`          | `16`                       |
    /// | `ACCOUNT_REFRESH_STAGE_DELAY_MS`   | `500`                      |
    /// | `STICKER_CACHE_DIR`                | `gifts_cache`              |
    /// | `TELEGRAM_GATEWAY_URL`             | `http://127.0.0.1:8081`    |
    /// | `TELEGRAM_BOT_API_URL`             | `https://api.telegram.org` |
    /// | `REMOTE_TIMEOUT_SECS`              | `30`                       |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auto_refresh_interval_secs: env_parse(
                "GIFTS_AUTO_REFRESH_INTERVAL_SECS",
                defaults.auto_refresh_interval_secs,
            ),
            rate_limit_backoff_secs: env_parse(
                "GIFTS_RATE_LIMIT_BACKOFF_SECS",
                defaults.rate_limit_backoff_secs,
            ),
            poll_wait_secs: env_parse("GIFTS_POLL_WAIT_SECS", defaults.poll_wait_secs),
            subscriber_buffer: env_parse("GIFTS_SUBSCRIBER_BUFFER", defaults.subscriber_buffer),
            stage_delay_ms: env_parse("ACCOUNT_REFRESH_STAGE_DELAY_MS", defaults.stage_delay_ms),
            sticker_cache_dir: std::env::var("STICKER_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.sticker_cache_dir),
            gateway_url: std::env::var("TELEGRAM_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            bot_api_url: std::env::var("TELEGRAM_BOT_API_URL").unwrap_or(defaults.bot_api_url),
            remote_timeout_secs: env_parse("REMOTE_TIMEOUT_SECS", defaults.remote_timeout_secs),
        }
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_interval_secs)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_secs(self.poll_wait_secs)
    }

    pub fn stage_delay(&self) -> Duration {
        Duration::from_millis(self.stage_delay_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

/// Parse an optional numeric env var, panicking on malformed values.
pub(crate) fn env_parse<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid number: {e}")),
        Err(_) => default,
    }
}
