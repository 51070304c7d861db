/**
 * Application State
 *
 * The central state container shared by every handler: configuration,
 * the durable store pool, the hot-tier cache, the session registry with
 * its per-document write lanes, and the dispatcher/lifecycle services
 * built over them.
 *
 * Everything inside is cheap to clone: pools and caches clone handles,
 * services sit behind `Arc`.
 */
use std::sync::Arc;

use sqlx::PgPool;

use crate::backend::docs::cache::DocCache;
use crate::backend::docs::{DocLanes, EditDispatcher, LifecycleController};
use crate::backend::registry::SessionRegistry;
use crate::backend::server::config::ServerConfig;

/// Application state passed to every Axum handler and socket task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// `None` when `DATABASE_URL` is not configured; handlers degrade.
    pub db_pool: Option<PgPool>,
    pub cache: DocCache,
    pub registry: Arc<SessionRegistry>,
    pub lanes: Arc<DocLanes>,
    pub dispatcher: Arc<EditDispatcher>,
    pub lifecycle: Arc<LifecycleController>,
}

impl AppState {
    /// Assemble the state over already-connected tiers.
    pub fn new(config: ServerConfig, db_pool: Option<PgPool>, cache: DocCache) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let lanes = Arc::new(DocLanes::new());
        let dispatcher = Arc::new(EditDispatcher::new(
            cache.clone(),
            db_pool.clone(),
            registry.clone(),
            lanes.clone(),
        ));
        let lifecycle = Arc::new(LifecycleController::new(
            cache.clone(),
            db_pool.clone(),
            registry.clone(),
            lanes.clone(),
        ));
        Self {
            config: Arc::new(config),
            db_pool,
            cache,
            registry,
            lanes,
            dispatcher,
            lifecycle,
        }
    }

    /// In-memory state for tests: no durable store, process-local cache.
    pub fn for_tests(config: ServerConfig) -> Self {
        Self::new(config, None, DocCache::in_memory())
    }
}
