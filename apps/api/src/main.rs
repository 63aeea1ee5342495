//! # Meridian API
//!
//! HTTP gateway for the Meridian ERP coordination core.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         API Gateway                                     │
//! │                                                                         │
//! │  Client ───► HTTP (8080) ───► interceptors ───► handlers ───► Redis    │
//! │                                                     │                   │
//! │                                                     ▼                   │
//! │                              QueueDrainWorker ───► PostgreSQL           │
//! │                                                   (audit_logs)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use meridian_api::{router, ApiConfig, AppState};
use meridian_coord::{QueueDrainWorker, RedisStore};
use meridian_db::Database;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_thread_ids(true)
        .pretty()
        .init();

    info!("Starting Meridian API server...");

    // Load configuration
    let config = ApiConfig::load()?;
    info!(
        port = config.http_port,
        db_url = %config.database_url.chars().take(30).collect::<String>(),
        "Configuration loaded"
    );
    if config.admin_password_hash.is_none() {
        warn!("ADMIN_PASSWORD_HASH not set, password login is disabled");
    }

    // Connect to database
    let db = Database::connect(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    // Run migrations
    db.run_migrations().await?;
    info!("Database migrations complete");

    // Connect to Redis (the coordination backbone is not optional)
    let store = Arc::new(RedisStore::connect(&config.coord.redis_url).await?);
    info!("Connected to Redis");

    let http_port = config.http_port;
    let batch_size = config.coord.audit_batch_size;
    let poll_interval = config.coord.audit_poll_interval();

    // Create shared state
    let state = AppState::new(store, config);

    // Start the audit drain worker
    let (drain_worker, drain_handle) = QueueDrainWorker::new(
        state.audit.clone(),
        Arc::new(db.audit_logs()),
        batch_size,
        poll_interval,
    );
    let drain_task = tokio::spawn(drain_worker.run());

    // Build server address
    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!(%addr, "Starting HTTP server");

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop the worker after the server has drained its connections so
    // audit entries from in-flight requests still reach the sink.
    if let Err(e) = drain_handle.shutdown().await {
        warn!(error = %e, "Drain worker did not acknowledge shutdown");
    }
    if let Err(e) = drain_task.await {
        warn!(error = %e, "Drain worker task panicked");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => {
                warn!("Failed to install signal handler");
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
