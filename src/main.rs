// This is the entry point of the coin shop service.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases)
// - `api/` = HTTP adapters (routes, auth gate, JSON bodies)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Serve HTTP until asked to stop

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "api/api_layer.rs"]
mod api;
mod config;
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
mod logging;

use crate::api::{create_router, AppState, Backend};
use crate::config::{AppConfig, StorageBackend};
use crate::core::auth::{AuthConfig, AuthService, TokenIssuer};
use crate::core::shop::{ShopConfig, ShopService};
use crate::infra::in_memory::InMemoryStore;
use crate::infra::sqlite::SqliteStore;
use anyhow::Context;
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    logging::init_logging(&config.log_level, config.log_format);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // The storage backend is the only thing that varies; everything above it
    // is wired the same way in `serve`.

    match config.storage_backend {
        StorageBackend::Sqlite => {
            let store = SqliteStore::new(&config.database_path)
                .await
                .with_context(|| format!("Failed to open database {}", config.database_path))?;
            info!(path = %config.database_path, "Using SQLite storage");

            let result = serve(store.clone(), &config).await;
            store.close().await;
            result
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage, data is lost on exit");
            serve(InMemoryStore::new(), &config).await
        }
    }
}

async fn serve<S: Backend>(store: S, config: &AppConfig) -> anyhow::Result<()> {
    let shop = ShopService::new_with_config(
        store.clone(),
        ShopConfig {
            allow_self_transfer: config.allow_self_transfer,
        },
    );
    let token_lifetime = chrono::Duration::try_hours(config.token_ttl_hours)
        .context("Token lifetime out of range")?;
    let auth = AuthService::new(
        store,
        TokenIssuer::new(&config.jwt_secret, token_lifetime),
        AuthConfig {
            starting_coins: config.starting_coins,
        },
    );
    let router = create_router(AppState::new(shop, auth));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Coin shop listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
