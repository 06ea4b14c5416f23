//! Fatbox Server
//!
//! Relays chunked and direct uploads to public file hosts, with content
//! hash deduplication and a download passthrough.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fatbox::config::Config;
use fatbox::db;
use fatbox::routes;
use fatbox::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "fatbox=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    tracing::info!("Starting Fatbox v{}", env!("CARGO_PKG_VERSION"));

    for dir in [&config.storage.uploads_dir, &config.storage.temp_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Could not create directory {}", dir.display()))?;
    }
    tracing::info!(
        uploads_dir = %config.storage.uploads_dir.display(),
        temp_dir = %config.storage.temp_dir.display(),
        "Storage directories ready"
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database.url, config.database.max_connections)
        .await
        .context("Could not initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    let app_state = AppState::new(config.clone(), db_pool).context("Could not build application state")?;
    let app = routes::app(app_state.clone());

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid SERVER_HOST/SERVER_PORT")?;
    tracing::info!("Fatbox listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app_state.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
