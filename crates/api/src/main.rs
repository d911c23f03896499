use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use giftpanel_api::config::ServerConfig;
use giftpanel_api::router::build_app_router;
use giftpanel_api::state::{AppState, EngineDeps};
use giftpanel_db::DbPool;
use giftpanel_sync::PgStore;
use giftpanel_telegram::{BotApiClient, GatewayClient};
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "giftpanel_api=debug,giftpanel_sync=debug,tower_http=debug";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        auto_refresh_interval_secs = config.sync.auto_refresh_interval_secs,
        "Loaded server configuration",
    );

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = prepare_database(&database_url).await;

    let state = build_state(config.clone(), pool);
    let sync = Arc::clone(&state.sync);
    match sync.resume_auto_refresh().await {
        Ok(resumed) => tracing::info!(resumed, "Gift auto-refresh workers resumed"),
        Err(e) => tracing::error!(error = %e, "Could not resume gift auto-refresh"),
    }

    let addr = SocketAddr::new(
        config.host.parse().expect("HOST must be an IP address"),
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    tracing::info!(%addr, "Gift panel API listening");

    axum::serve(listener, build_app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");

    // Stop timers only after in-flight requests have drained.
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(grace, sync.shutdown()).await.is_err() {
        tracing::warn!(grace_secs = grace.as_secs(), "Gift sync shutdown exceeded grace period");
    }
    tracing::info!("Shutdown complete");
}

/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` selects
/// structured output.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Connect, verify and migrate. Any failure aborts startup.
async fn prepare_database(url: &str) -> DbPool {
    let pool = giftpanel_db::create_pool(url)
        .await
        .expect("Failed to connect to database");
    giftpanel_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    giftpanel_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");
    pool
}

/// PostgreSQL stores plus the HTTP remote clients.
fn build_state(config: ServerConfig, pool: DbPool) -> AppState {
    let sync_config = &config.sync;
    let gateway = Arc::new(
        GatewayClient::new(&sync_config.gateway_url, sync_config.remote_timeout())
            .expect("Failed to build session gateway client"),
    );
    let bot_api = Arc::new(
        BotApiClient::new(&sync_config.bot_api_url, sync_config.remote_timeout())
            .expect("Failed to build Bot API client"),
    );
    tracing::info!(gateway = %sync_config.gateway_url, "Remote clients ready");

    let store = Arc::new(PgStore::new(pool.clone()));
    let deps = EngineDeps {
        accounts: store.clone(),
        snapshots: store.clone(),
        settings: store,
        gifts: gateway.clone(),
        profiles: gateway,
        downloader: bot_api,
    };
    AppState::build(config, Some(pool), deps)
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => tracing::info!("SIGINT received, draining connections"),
        () = terminate => tracing::info!("SIGTERM received, draining connections"),
    }
}
