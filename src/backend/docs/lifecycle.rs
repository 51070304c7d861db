/**
 * Lifecycle Controller
 *
 * Document state transitions outside the edit path: lock/unlock,
 * owner-initiated snapshot and sync, last-viewer write-through, startup
 * rehydrate and graceful shutdown.
 *
 * Snapshot and sync set the document LOCKED first and release the write
 * lane before touching the durable store, so a live editor observes an
 * explicit `editRejected` instead of stalling behind storage I/O. LOCKED
 * is a cache-only state; rows are never persisted as locked.
 */
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::docs::cache::DocCache;
use crate::backend::docs::lanes::DocLanes;
use crate::backend::docs::record::{DocRecord, DocStatus};
use crate::backend::docs::{materialize, store, MaterializeError};
use crate::backend::error::BackendError;
use crate::backend::registry::{SessionRegistry, CLOSE_GOING_AWAY};
use crate::shared::envelope::server_event;
use crate::shared::Envelope;

pub struct LifecycleController {
    cache: DocCache,
    pool: Option<PgPool>,
    registry: Arc<SessionRegistry>,
    lanes: Arc<DocLanes>,
}

impl LifecycleController {
    pub fn new(
        cache: DocCache,
        pool: Option<PgPool>,
        registry: Arc<SessionRegistry>,
        lanes: Arc<DocLanes>,
    ) -> Self {
        Self {
            cache,
            pool,
            registry,
            lanes,
        }
    }

    fn map_materialize(err: MaterializeError) -> BackendError {
        match err {
            MaterializeError::NotFound => BackendError::not_found("document"),
            MaterializeError::Unavailable => {
                BackendError::transient("hot tier", "document cannot be materialized")
            }
            MaterializeError::Database(e) => BackendError::Database(e),
        }
    }

    /// Set the document LOCKED and tell its viewers. Edits are rejected
    /// until unlock.
    pub async fn lock_doc(&self, doc_id: Uuid, reason: &str) -> Result<(), BackendError> {
        let lane = self.lanes.lane(doc_id);
        {
            let _guard = lane.lock().await;
            let mut record = materialize(&self.cache, self.pool.as_ref(), doc_id)
                .await
                .map_err(Self::map_materialize)?;
            record.status = DocStatus::Locked;
            record.lock_reason = Some(reason.to_string());
            if !self.cache.put(&record).await {
                return Err(BackendError::transient("hot tier", "lock not stored"));
            }
        }
        self.broadcast_status(doc_id, DocStatus::Locked, Some(reason));
        Ok(())
    }

    /// Set the document back to NORMAL and tell its viewers.
    pub async fn unlock_doc(&self, doc_id: Uuid) -> Result<(), BackendError> {
        let lane = self.lanes.lane(doc_id);
        {
            let _guard = lane.lock().await;
            let updated = self
                .cache
                .update(doc_id, |record| {
                    record.status = DocStatus::Normal;
                    record.lock_reason = None;
                })
                .await;
            if !updated {
                return Err(BackendError::not_found("document"));
            }
        }
        self.broadcast_status(doc_id, DocStatus::Normal, None);
        Ok(())
    }

    fn broadcast_status(&self, doc_id: Uuid, status: DocStatus, reason: Option<&str>) {
        let envelope = Envelope::server(
            server_event::DOC_STATUS_CHANGED,
            serde_json::json!({
                "docId": doc_id,
                "status": status,
                "reason": reason,
            }),
        );
        self.registry.broadcast_to_doc(doc_id, &envelope, None);
    }

    /// Called when a viewer leaves a doc room. When it was the last one,
    /// accrued edits are written through so they survive process loss.
    /// A failed write logs and does not retry; the next snapshot or sync
    /// covers it.
    pub async fn on_last_viewer_leave(&self, doc_id: Uuid) {
        if self.registry.doc_user_count(doc_id) > 0 {
            return;
        }
        let Some(pool) = self.pool.as_ref() else {
            tracing::warn!(
                "[Lifecycle] no durable store; edits to {} stay cache-only",
                doc_id
            );
            return;
        };

        let lane = self.lanes.lane(doc_id);
        let _guard = lane.lock().await;
        let Some(mut record) = self.cache.get(doc_id).await else {
            return;
        };
        if !record.dirty {
            return;
        }
        match store::write_through(pool, &record).await {
            Ok(written) => {
                if written {
                    record.dirty = false;
                    self.cache.put(&record).await;
                    tracing::info!(
                        "[Lifecycle] wrote through {} at version {}",
                        doc_id,
                        record.version
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    "[Lifecycle] write-through of {} failed: {} (next snapshot or sync covers it)",
                    doc_id,
                    e
                );
            }
        }
    }

    /// Owner-initiated snapshot: persist the live state, truncate the op
    /// log, bump the snapshot component and tell every viewer.
    pub async fn snapshot_doc(
        &self,
        doc_id: Uuid,
        user_id: Uuid,
    ) -> Result<DocRecord, BackendError> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| BackendError::transient("durable store", "not configured"))?
            .clone();

        self.check_owner(doc_id, user_id).await?;
        self.lock_doc(doc_id, "snapshot in progress").await?;

        // The doc is LOCKED: the dispatcher rejects edits, so the record
        // is stable while storage I/O runs outside the lane.
        let result = self.cut_snapshot(&pool, doc_id).await;

        match result {
            Ok(record) => {
                let envelope = Envelope::server(
                    server_event::DOC_SNAPSHOT_CREATED,
                    serde_json::json!({
                        "docId": doc_id,
                        "version": record.version,
                        "content": record.content,
                    }),
                );
                self.registry.broadcast_to_doc(doc_id, &envelope, None);
                Ok(record)
            }
            Err(e) => {
                // Leave the doc editable again even when the cut failed.
                if let Err(unlock_err) = self.unlock_doc(doc_id).await {
                    tracing::error!(
                        "[Lifecycle] failed to unlock {} after snapshot error: {}",
                        doc_id,
                        unlock_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn cut_snapshot(&self, pool: &PgPool, doc_id: Uuid) -> Result<DocRecord, BackendError> {
        let Some(record) = self.cache.get(doc_id).await else {
            return Err(BackendError::not_found("document"));
        };

        // Persist the pre-snapshot state first so the snapshot row update
        // never races a lower version in.
        store::write_through(pool, &record).await?;

        let mut snapped = record;
        snapped.version.bump_snapshot();
        snapped.op_log.clear();
        snapped.last_snapshot_at = Some(Utc::now());
        snapped.status = DocStatus::Normal;
        snapped.lock_reason = None;
        snapped.dirty = false;

        store::snapshot(
            pool,
            doc_id,
            &snapped.content,
            &snapped.chunks,
            snapped.version,
            snapped.last_snapshot_at.unwrap_or_else(Utc::now),
        )
        .await?;

        let lane = self.lanes.lane(doc_id);
        {
            let _guard = lane.lock().await;
            if !self.cache.put(&snapped).await {
                return Err(BackendError::transient("hot tier", "snapshot not cached"));
            }
        }
        self.broadcast_status(doc_id, DocStatus::Normal, None);
        Ok(snapped)
    }

    /// Owner-initiated sync: write the live state through and tell the
    /// channel.
    pub async fn sync_doc(&self, doc_id: Uuid, user_id: Uuid) -> Result<DocRecord, BackendError> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| BackendError::transient("durable store", "not configured"))?
            .clone();

        let record = self.check_owner(doc_id, user_id).await?;
        self.lock_doc(doc_id, "sync in progress").await?;

        let result = async {
            let Some(mut current) = self.cache.get(doc_id).await else {
                return Err(BackendError::not_found("document"));
            };
            store::write_through(&pool, &current).await?;
            current.dirty = false;
            current.status = DocStatus::Normal;
            current.lock_reason = None;
            let lane = self.lanes.lane(doc_id);
            {
                let _guard = lane.lock().await;
                if !self.cache.put(&current).await {
                    return Err(BackendError::transient("hot tier", "sync not cached"));
                }
            }
            Ok(current)
        }
        .await;

        match result {
            Ok(current) => {
                self.broadcast_status(doc_id, DocStatus::Normal, None);
                let envelope = Envelope::server(
                    server_event::DOC_SYNC_COMPLETED,
                    serde_json::json!({
                        "docId": doc_id,
                        "version": current.version,
                    }),
                );
                self.registry
                    .broadcast_to_channel(record.channel_id, &envelope, None);
                Ok(current)
            }
            Err(e) => {
                if let Err(unlock_err) = self.unlock_doc(doc_id).await {
                    tracing::error!(
                        "[Lifecycle] failed to unlock {} after sync error: {}",
                        doc_id,
                        unlock_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn check_owner(&self, doc_id: Uuid, user_id: Uuid) -> Result<DocRecord, BackendError> {
        let record = materialize(&self.cache, self.pool.as_ref(), doc_id)
            .await
            .map_err(Self::map_materialize)?;
        if record.created_by != user_id {
            return Err(BackendError::authorization(
                "only the document owner may do this",
            ));
        }
        Ok(record)
    }

    /// Startup: flush the hot tier (a cache surviving a crash cannot be
    /// trusted), then prefetch every live document. Per-document failures
    /// are logged; the document loads lazily on its first viewer instead.
    pub async fn startup(&self) -> Result<usize, BackendError> {
        if !self.cache.flush_all().await {
            tracing::warn!("[Lifecycle] hot tier flush failed; continuing degraded");
        }

        let Some(pool) = self.pool.as_ref() else {
            tracing::warn!("[Lifecycle] no durable store configured; nothing to prefetch");
            return Ok(0);
        };

        let ids = store::list_all_live_ids(pool).await?;
        let total = ids.len();
        let mut loaded = 0usize;
        for doc_id in ids {
            match materialize(&self.cache, Some(pool), doc_id).await {
                Ok(_) => loaded += 1,
                Err(e) => {
                    tracing::warn!("[Lifecycle] prefetch of {} failed: {}", doc_id, e);
                }
            }
        }
        tracing::info!("[Lifecycle] prefetched {}/{} documents", loaded, total);
        Ok(loaded)
    }

    /// Graceful shutdown: close every socket with a going-away status,
    /// then write through every dirty document that still had viewers.
    pub async fn shutdown(&self) {
        let open_docs = self.registry.docs_with_viewers();
        self.registry.kick_all(CLOSE_GOING_AWAY);

        let Some(pool) = self.pool.as_ref() else {
            tracing::warn!("[Lifecycle] shutting down without durable store; dirty docs lost");
            return;
        };
        for doc_id in open_docs {
            let Some(record) = self.cache.get(doc_id).await else {
                continue;
            };
            if !record.dirty {
                continue;
            }
            match store::write_through(pool, &record).await {
                Ok(true) => {
                    tracing::info!("[Lifecycle] shutdown wrote through {}", doc_id)
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("[Lifecycle] shutdown write-through of {} failed: {}", doc_id, e)
                }
            }
        }
    }
}
