//! # Beacon Server
//!
//! Process bootstrap for the queue dispatcher.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Startup Sequence                                 │
//! │                                                                         │
//! │  1. tracing (RUST_LOG, default info,beacon=debug,sqlx=warn)            │
//! │  2. BeaconConfig::load(--config | BEACON_CONFIG | platform dir)        │
//! │  3. Database::new → migrations                                         │
//! │  4. register [[counters]] from config                                  │
//! │  5. EventBroadcaster + DispatchEngine                                  │
//! │  6. spawn StalenessReconciler (if enabled)                             │
//! │  7. spawn WebhookForwarder (if events.webhook_url)                     │
//! │  8. axum::serve until Ctrl+C / SIGTERM                                 │
//! │  9. stop background tasks, close pools                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```bash
//! beacon-server --config ./beacon.toml
//! BEACON_PORT=9000 BEACON_DB_PATH=/var/lib/beacon/beacon.db beacon-server
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use beacon_db::{Database, DbConfig};
use beacon_dispatch::{
    BeaconConfig, DispatchEngine, EventBroadcaster, StalenessReconciler, WebhookForwarder,
};
use beacon_server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let Some(config_path) = parse_args() else {
        return Ok(());
    };

    info!("Starting Beacon queue server...");

    // Load configuration
    let config = BeaconConfig::load(config_path).context("loading configuration")?;
    info!(
        addr = %config.server.bind_address(),
        db = %config.database.path.display(),
        reconciler = config.reconciler.enabled,
        "Configuration loaded"
    );

    // Open database
    let db_config =
        DbConfig::new(&config.database.path).max_connections(config.database.max_connections);
    let db = Database::new(db_config).await.context("opening database")?;

    for seed in &config.counters {
        db.counters()
            .register(&seed.label, seed.number)
            .await
            .with_context(|| format!("registering counter {}", seed.number))?;
    }

    // Engine and event fan-out
    let broadcaster = EventBroadcaster::new(config.events.capacity);
    let engine = Arc::new(DispatchEngine::new(db.clone(), broadcaster.clone()));

    let reconciler = if config.reconciler.enabled {
        let (reconciler, handle) =
            StalenessReconciler::new(db.clone(), broadcaster.clone(), config.reconciler.clone());
        tokio::spawn(reconciler.run());
        Some(handle)
    } else {
        info!("Staleness reconciler disabled");
        None
    };

    let webhook = match &config.events.webhook_url {
        Some(url) => {
            let (forwarder, handle) = WebhookForwarder::new(
                url.clone(),
                Duration::from_secs(config.events.webhook_max_elapsed_secs),
                broadcaster.subscribe(),
            )?;
            tokio::spawn(forwarder.run());
            Some(handle)
        }
        None => None,
    };

    // Serve
    let app = router(AppState::new(engine));
    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    // Teardown
    if let Some(handle) = reconciler {
        handle.shutdown().await;
    }
    if let Some(handle) = webhook {
        handle.shutdown().await;
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=beacon_dispatch=trace` - Trace the engine only
/// - Default: `info,beacon=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,beacon=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Returns the `--config` path, or `None` after printing help.
fn parse_args() -> Option<Option<PathBuf>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Beacon Queue Server");
                println!();
                println!("Usage: beacon-server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: BEACON_CONFIG or platform config dir)");
                println!("  -h, --help           Show this help message");
                return None;
            }
            _ => {}
        }
        i += 1;
    }

    Some(config_path)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to listen for Ctrl+C");
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
                error!(?e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
