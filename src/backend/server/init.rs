/**
 * Server Initialization
 *
 * Connects both storage tiers, assembles the application state, runs
 * startup lifecycle (hot-tier flush + document prefetch) and builds the
 * router.
 *
 * # Failure policy
 *
 * - Durable store configured but unreachable: fatal; the process must
 *   not come up pretending it can persist.
 * - Durable store not configured: the server runs degraded (development
 *   mode), documents live in the cache only.
 * - Hot tier unreachable: the server falls back to the in-process cache
 *   with a loud warning; a multi-process deployment must not run this way.
 */
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

use crate::backend::docs::cache::DocCache;
use crate::backend::routes::create_router;
use crate::backend::server::config::ServerConfig;
use crate::backend::server::state::AppState;

/// Create and configure the application.
///
/// Returns the router plus the assembled state so the caller can reach
/// the lifecycle controller for graceful shutdown.
pub async fn create_app() -> Result<(Router<()>, AppState), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env();
    tracing::info!(
        "Initializing xfdocs server (service version {})",
        config.service_version
    );

    let db_pool = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to durable store...");
            let pool = PgPoolOptions::new()
                .max_connections(16)
                .acquire_timeout(Duration::from_secs(5))
                .connect(url)
                .await?;
            tracing::info!("Durable store connected; running migrations...");
            sqlx::migrate!().run(&pool).await?;
            Some(pool)
        }
        None => None,
    };

    let cache = match &config.hot_tier_url {
        Some(url) => match DocCache::connect(url).await {
            Ok(cache) => {
                tracing::info!("Hot tier connected");
                cache
            }
            Err(e) => {
                tracing::error!(
                    "Hot tier unreachable ({}); falling back to in-process cache",
                    e
                );
                DocCache::in_memory()
            }
        },
        None => DocCache::in_memory(),
    };

    let state = AppState::new(config, db_pool, cache);

    match state.lifecycle.startup().await {
        Ok(loaded) => tracing::info!("Startup rehydrate complete ({loaded} documents)"),
        Err(e) => tracing::error!("Startup rehydrate failed: {e}"),
    }

    let app = create_router(state.clone());
    Ok((app, state))
}
