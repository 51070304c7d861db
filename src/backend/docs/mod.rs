//! Documents: the cached record shape, the hot tier, the durable store
//! adapter, the edit dispatcher and the lifecycle controller.

/// Cached document record and status
pub mod record;

/// Hot-tier cache
pub mod cache;

/// Durable store adapter
pub mod store;

/// Per-document write lanes
pub mod lanes;

/// Edit dispatcher
pub mod dispatcher;

/// Lifecycle controller
pub mod lifecycle;

use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::docs::cache::DocCache;

pub use dispatcher::EditDispatcher;
pub use lanes::DocLanes;
pub use lifecycle::LifecycleController;
pub use record::{DocRecord, DocStatus};

/// Why a document could not be brought into the cache.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("document not found")]
    NotFound,
    /// Neither tier can produce the document right now.
    #[error("document unavailable")]
    Unavailable,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Bring a document into the cache, loading and rehydrating from the
/// durable store on a miss. Soft-deleted documents are never cached; a
/// deleted record found in the cache is evicted on sight.
pub async fn materialize(
    cache: &DocCache,
    pool: Option<&PgPool>,
    doc_id: Uuid,
) -> Result<DocRecord, MaterializeError> {
    if let Some(record) = cache.get(doc_id).await {
        if record.status == DocStatus::Deleted {
            cache.delete(doc_id).await;
            return Err(MaterializeError::NotFound);
        }
        return Ok(record);
    }

    let Some(pool) = pool else {
        return Err(MaterializeError::Unavailable);
    };

    let row = store::load_doc(pool, doc_id).await?;
    let Some(row) = row else {
        return Err(MaterializeError::NotFound);
    };
    if row.status == DocStatus::Deleted {
        return Err(MaterializeError::NotFound);
    }

    let record = store::rehydrate(row);
    if !cache.put(&record).await {
        tracing::warn!("[Docs] cache refused record for {}", doc_id);
    }
    Ok(record)
}
