//! Lumen Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use lumen_core::{
    api::{self, AppState},
    config::{BackendKind, Config},
    db::{DataStore, IdentityProvider, MemoryStore, RestStore},
    middleware::RateLimitService,
    telemetry::{init_logging, init_metrics},
};

#[derive(Debug, Parser)]
#[command(name = "lumen-server", version, about = "Lumen course platform API")]
struct Cli {
    /// Configuration file, layered under LUMEN__* environment variables
    #[arg(short, long, env = "LUMEN_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    init_logging(&config.logging)?;
    let metrics = init_metrics(&config.metrics, "lumen-server")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.backend.kind,
        "Starting Lumen Server"
    );

    let (store, identity): (Arc<dyn DataStore>, Arc<dyn IdentityProvider>) = match config.backend.kind {
        BackendKind::Memory => {
            tracing::warn!("Using the in-memory backend; data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn DataStore>, store as Arc<dyn IdentityProvider>)
        }
        BackendKind::Rest => {
            let store = Arc::new(RestStore::new(config.backend.rest_store_config()?)?);
            (store.clone() as Arc<dyn DataStore>, store as Arc<dyn IdentityProvider>)
        }
    };

    let limiter = Arc::new(RateLimitService::new(config.rate_limit.clone()));
    let app = api::build_router(AppState::new(store, identity, limiter, metrics));

    let addr: SocketAddr = config.server.bind_address().parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
