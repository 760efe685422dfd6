use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use sqlx::PgPool;
use tokio::signal;
use tracing::{info, warn};

use policyd::api::routes::{create_router, AppState};
use policyd::config::Config;
use policyd::events::{BroadcastNotifier, FanoutNotifier, Notifier, PgNotifier};
use policyd::observability::{init_tracing, MetricsRegistry};
use policyd::policy::{PolicyCache, PolicyService};
use policyd::storage::{MemoryStorage, PostgresStorage, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting policyd"
    );

    let metrics = Arc::new(MetricsRegistry::new());
    let local = Arc::new(BroadcastNotifier::new(config.notify_capacity));

    // Select storage backend
    let (storage, notifier, pool): (Arc<dyn Storage>, Arc<dyn Notifier>, Option<PgPool>) =
        match config.database_url.as_deref().filter(|_| config.uses_database()) {
            Some(url) => {
                let pg = PostgresStorage::connect(
                    url,
                    config.db_min_connections,
                    config.db_max_connections,
                )
                .await?;

                if config.run_migrations {
                    pg.run_migrations().await?;
                    info!("Database migrations applied");
                }

                let pool = pg.pool().clone();
                let targets: Vec<Arc<dyn Notifier>> =
                    vec![local.clone(), Arc::new(PgNotifier::new(pool.clone()))];

                let storage: Arc<dyn Storage> = Arc::new(pg);
                let notifier: Arc<dyn Notifier> = Arc::new(FanoutNotifier::new(targets));

                info!("Using Postgres storage");
                (storage, notifier, Some(pool))
            }
            None => {
                warn!("No database configured, policies will not survive a restart");
                let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
                let notifier: Arc<dyn Notifier> = local.clone();
                (storage, notifier, None)
            }
        };

    // Start policy cache
    let cache = PolicyCache::new(
        storage.clone(),
        local.subscribe(),
        config.cache_refresh_interval(),
        metrics.clone(),
    );
    let (snapshot_rx, cache_handle) = cache.start().await;

    // Create application state
    let state = Arc::new(AppState {
        service: PolicyService::new(storage, notifier, metrics),
        snapshot_rx,
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    // Create router
    let app = create_router(state);

    // Parse listen address
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(addr = %addr, "Starting HTTP server");

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    if config.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    // Cleanup
    info!("Shutting down...");
    cache_handle.abort();

    if let Some(pool) = pool {
        if tokio::time::timeout(config.shutdown_timeout(), pool.close())
            .await
            .is_err()
        {
            warn!("Timed out closing database pool");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
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

    info!("Received shutdown signal");
}
