//! Blogfed binary entry point

use blogfed::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start background tasks (metadata cache pruning)
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    let default_filter = format!("blogfed={},tower_http=debug", config.logging.level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if config.logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!(
        domain = %config.server.domain,
        protocol = %config.server.protocol,
        "Starting Blogfed..."
    );

    blogfed::metrics::init_metrics();

    // 3. Initialize application state
    let state = AppState::new(config.clone()).await?;

    // 4. Build Axum router
    let app = blogfed::build_router(state.clone());

    // 5. Start background tasks
    spawn_cache_prune_task(state.clone());

    // 6. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Public URL: {}", config.default_instance_url());

    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn background metadata cache pruning
fn spawn_cache_prune_task(state: AppState) {
    let interval_secs = state.config.federation.cache_prune_interval_seconds.max(1);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        // The first tick completes immediately; nothing can have expired yet.
        interval.tick().await;

        loop {
            interval.tick().await;

            let removed = state.metadata_cache.prune_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Pruned expired federation metadata");
            }
        }
    });

    tracing::info!(interval_secs, "Metadata cache prune task spawned");
}
