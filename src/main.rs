use ledger_sync_service::{api, blockchain, cache::InfoCache, config::Config, db, state::AppState};

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ledger-sync-service");

    // Load configuration
    let config = Config::from_env();
    tracing::info!(
        "Configuration loaded: {} explorer networks, update interval {:?}",
        config.explorer_networks.len(),
        config.update_interval
    );

    // Setup database connection
    let db_pool = db::connection::connect(&config.database_url).await?;
    tracing::info!("Database connection established");

    let registry = Arc::new(blockchain::registry_from_config(&config)?);
    if registry.is_empty() {
        tracing::warn!("No networks configured, the sync engine will stay idle");
    }

    let info_cache = InfoCache::from_config(&config);
    tracing::info!(
        "Info cache initialized with TTL: {:?} and capacity: {}",
        config.cache_ttl,
        config.cache_max_capacity
    );

    // Create shared state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        db_pool,
        registry,
        info_cache,
    });

    // Start the synchronization engine
    let shutdown = CancellationToken::new();
    let engine = tokio::spawn(blockchain::start_polling(app_state.clone(), shutdown.clone()));
    tracing::info!("Synchronization engine started");

    // Start HTTP server
    let app = api::create_router(app_state);
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Starting server on {}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            signal.cancel();
        })
        .await?;

    // The server may stop for other reasons; make sure the loops stop too.
    shutdown.cancel();
    engine.await?;
    tracing::info!("Synchronization engine stopped");

    Ok(())
}
