/**
 * Edit Dispatcher
 *
 * Entry point for every document mutation arriving over the wire. The
 * dispatcher validates the intent, routes it to the chunk store through
 * the cached record, appends the op-log entry, bumps the version, writes
 * the record back to the cache, and fans the authoritative operation out
 * to every viewer of the document, originator included, so speculating
 * clients can replace local placeholders with server-allocated ids.
 *
 * The whole mutate sequence for one document runs under that document's
 * write lane; the fan-out happens after the lane is released. The
 * dispatcher never raises: every path returns a tagged outcome the wire
 * layer converts into an envelope.
 */
use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::docs::cache::DocCache;
use crate::backend::docs::lanes::DocLanes;
use crate::backend::docs::record::DocStatus;
use crate::backend::docs::{materialize, MaterializeError};
use crate::backend::registry::SessionRegistry;
use crate::shared::crdt::{ChunkError, ChunkList, DeleteOutcome, DocOp, LseqId, OpLogEntry, Version};
use crate::shared::envelope::server_event;
use crate::shared::intent::{BatchEdit, BatchOp, ChunkRef, EditIntent};
use crate::shared::{Envelope, SharedError};

/// Why an edit did not apply. The wire layer maps each variant to its
/// protocol answer; none of these abort the connection.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// The session is not currently viewing the target document.
    #[error("not viewing this document")]
    NotViewing,
    /// The document does not exist (or is deleted).
    #[error("document not found")]
    NotFound,
    /// Neither tier can produce or accept the document right now.
    #[error("document unavailable")]
    Unavailable,
    /// The document status rejects edits; answered with `editRejected`.
    #[error("edit rejected")]
    Rejected {
        status: DocStatus,
        reason: Option<String>,
    },
    /// The intent failed a type or range precondition.
    #[error(transparent)]
    Validation(#[from] SharedError),
    /// A referenced chunk id did not resolve in the current list.
    #[error("stale reference: {0}")]
    Stale(String),
}

impl From<MaterializeError> for EditError {
    fn from(err: MaterializeError) -> Self {
        match err {
            MaterializeError::NotFound => EditError::NotFound,
            MaterializeError::Unavailable => EditError::Unavailable,
            MaterializeError::Database(e) => {
                tracing::warn!("[Dispatcher] durable store failed: {}", e);
                EditError::Unavailable
            }
        }
    }
}

fn chunk_error_to_edit_error(err: ChunkError) -> EditError {
    match err {
        ChunkError::NotFound(id) => EditError::Stale(format!("chunk {id} not found")),
        ChunkError::DuplicateId(id) => EditError::Stale(format!("chunk {id} already exists")),
        ChunkError::OffsetOutOfBounds { offset, len } => EditError::Validation(
            SharedError::validation("offset", format!("offset {offset} out of bounds for {len}")),
        ),
        ChunkError::EmptyText => {
            EditError::Validation(SharedError::validation("text", "must not be empty"))
        }
    }
}

/// A successfully applied edit.
#[derive(Debug)]
pub struct AppliedEdit {
    pub doc_id: Uuid,
    pub version: Version,
    /// The authoritative operations, with server-allocated ids.
    pub ops: Vec<DocOp>,
    /// True when a delete found its chunk already gone: no log entry was
    /// appended and nothing was broadcast.
    pub already_deleted: bool,
}

/// The dispatcher. One per process, shared behind an `Arc`.
pub struct EditDispatcher {
    cache: DocCache,
    pool: Option<PgPool>,
    registry: Arc<SessionRegistry>,
    lanes: Arc<DocLanes>,
}

impl EditDispatcher {
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

    /// Single-character intent (`editDoc`), the legacy per-keystroke path.
    pub async fn edit_doc(
        &self,
        session_id: Uuid,
        doc_id: Uuid,
        intent: EditIntent,
    ) -> Result<AppliedEdit, EditError> {
        if let EditIntent::Insert { value, .. } = &intent {
            if value.chars().count() != 1 {
                return Err(EditError::Validation(SharedError::validation(
                    "value",
                    "must be exactly one character",
                )));
            }
        }
        self.apply(session_id, doc_id, server_event::DOC_OP, move |chunks| {
            match intent {
                EditIntent::Insert {
                    left_id,
                    right_id,
                    value,
                } => {
                    let id = chunks
                        .insert_between(left_id.as_ref(), right_id.as_ref(), value.clone())
                        .map_err(chunk_error_to_edit_error)?;
                    Ok(vec![DocOp::Insert {
                        id,
                        text: value,
                        left_id,
                        right_id,
                    }])
                }
                EditIntent::Delete { id } => match chunks.delete(&id) {
                    DeleteOutcome::Deleted(text) => Ok(vec![DocOp::Delete { id, text }]),
                    DeleteOutcome::AlreadyDeleted => Ok(Vec::new()),
                },
            }
        })
        .await
    }

    /// Grouped intents (`editDocBatch`).
    pub async fn edit_doc_batch(
        &self,
        session_id: Uuid,
        doc_id: Uuid,
        batch: BatchEdit,
    ) -> Result<AppliedEdit, EditError> {
        self.apply(
            session_id,
            doc_id,
            server_event::DOC_OP_BATCH,
            move |chunks| match batch {
                BatchEdit::Insert {
                    text,
                    left_id,
                    right_id,
                } => {
                    let id = chunks
                        .insert_between(left_id.as_ref(), right_id.as_ref(), text.clone())
                        .map_err(chunk_error_to_edit_error)?;
                    Ok(vec![DocOp::Insert {
                        id,
                        text,
                        left_id,
                        right_id,
                    }])
                }
                BatchEdit::SplitInsert {
                    target_id,
                    offset,
                    text,
                } => {
                    let outcome = chunks
                        .split_and_insert(&target_id, offset, text.clone())
                        .map_err(chunk_error_to_edit_error)?;
                    Ok(vec![DocOp::Split {
                        target_id,
                        offset,
                        left_text: outcome.left_text,
                        insert_id: outcome.insert_id,
                        insert_text: text,
                        right_id: outcome.right_id,
                        right_text: outcome.right_text,
                    }])
                }
                BatchEdit::Ops { ops } => apply_op_sequence(chunks, ops),
            },
        )
        .await
    }

    /// Shared skeleton: validate the session, take the document lane,
    /// materialize, check status, run the mutation against a working copy
    /// of the chunk list, commit, write back, broadcast.
    async fn apply<F>(
        &self,
        session_id: Uuid,
        doc_id: Uuid,
        broadcast_event: &'static str,
        mutate: F,
    ) -> Result<AppliedEdit, EditError>
    where
        F: FnOnce(&mut ChunkList) -> Result<Vec<DocOp>, EditError>,
    {
        let session = self
            .registry
            .snapshot(session_id)
            .ok_or(EditError::NotViewing)?;
        if session.current_doc != Some(doc_id) {
            return Err(EditError::NotViewing);
        }

        let lane = self.lanes.lane(doc_id);
        let applied = {
            let _guard = lane.lock().await;

            let mut record = materialize(&self.cache, self.pool.as_ref(), doc_id).await?;
            if record.status != DocStatus::Normal {
                return Err(EditError::Rejected {
                    status: record.status,
                    reason: record.lock_reason.clone(),
                });
            }

            // Mutate a working copy so a failing batch leaves the cached
            // record untouched.
            let mut working = record.chunks.clone();
            let ops = mutate(&mut working)?;
            if ops.is_empty() {
                return Ok(AppliedEdit {
                    doc_id,
                    version: record.version,
                    ops,
                    already_deleted: true,
                });
            }

            record.chunks = working;
            for op in &ops {
                record
                    .op_log
                    .push(OpLogEntry::new(session.user_id, op.clone()));
                record.version.bump_log();
            }
            record.refresh_content();
            record.dirty = true;

            if !self.cache.put(&record).await {
                // The mutation has nowhere to live; report no progress
                // rather than acknowledge an edit that would vanish.
                return Err(EditError::Unavailable);
            }

            AppliedEdit {
                doc_id,
                version: record.version,
                ops,
                already_deleted: false,
            }
        };

        // Fan-out happens outside the lane: a slow room must not serialize
        // against the next edit.
        let payload = serde_json::json!({
            "docId": doc_id,
            "userId": session.user_id,
            "version": applied.version,
            "ops": &applied.ops,
        });
        let envelope = Envelope::server(broadcast_event, payload);
        let report = self.registry.broadcast_to_doc(doc_id, &envelope, None);
        if !report.overflowed.is_empty() {
            tracing::warn!(
                "[Dispatcher] {} viewer(s) of {} overflowed and were closed",
                report.overflowed.len(),
                doc_id
            );
        }

        Ok(applied)
    }
}

/// Apply a primitive-operation sequence, resolving `temp_N` placeholders
/// against the ids allocated by earlier operations of the same batch.
fn apply_op_sequence(chunks: &mut ChunkList, ops: Vec<BatchOp>) -> Result<Vec<DocOp>, EditError> {
    let mut allocated: Vec<Option<LseqId>> = Vec::with_capacity(ops.len());
    let mut applied: Vec<DocOp> = Vec::new();

    for (index, op) in ops.into_iter().enumerate() {
        let resolve = |reference: ChunkRef,
                       allocated: &[Option<LseqId>]|
         -> Result<LseqId, EditError> {
            match reference {
                ChunkRef::Id(id) => Ok(id),
                ChunkRef::Temp(n) => {
                    if n >= index {
                        return Err(EditError::Validation(SharedError::validation(
                            "ops",
                            format!("temp_{n} referenced before it was allocated"),
                        )));
                    }
                    allocated[n].clone().ok_or_else(|| {
                        EditError::Validation(SharedError::validation(
                            "ops",
                            format!("operation {n} did not allocate an id"),
                        ))
                    })
                }
            }
        };

        match op {
            BatchOp::Insert {
                text,
                left_id,
                right_id,
            } => {
                let left = left_id.map(|r| resolve(r, &allocated)).transpose()?;
                let right = right_id.map(|r| resolve(r, &allocated)).transpose()?;
                let id = chunks
                    .insert_between(left.as_ref(), right.as_ref(), text.clone())
                    .map_err(chunk_error_to_edit_error)?;
                allocated.push(Some(id.clone()));
                applied.push(DocOp::Insert {
                    id,
                    text,
                    left_id: left,
                    right_id: right,
                });
            }
            BatchOp::Split {
                target_id,
                offset,
                text,
            } => {
                let target = resolve(target_id, &allocated)?;
                let outcome = chunks
                    .split_and_insert(&target, offset, text.clone())
                    .map_err(chunk_error_to_edit_error)?;
                allocated.push(Some(outcome.insert_id.clone()));
                applied.push(DocOp::Split {
                    target_id: target,
                    offset,
                    left_text: outcome.left_text,
                    insert_id: outcome.insert_id,
                    insert_text: text,
                    right_id: outcome.right_id,
                    right_text: outcome.right_text,
                });
            }
            BatchOp::Delete { id } => {
                let id = resolve(id, &allocated)?;
                allocated.push(None);
                match chunks.delete(&id) {
                    DeleteOutcome::Deleted(text) => applied.push(DocOp::Delete { id, text }),
                    // A duplicate delete inside a batch is a no-op, the
                    // same as it is on replay.
                    DeleteOutcome::AlreadyDeleted => {}
                }
            }
            BatchOp::Trim {
                id,
                start_offset,
                end_offset,
            } => {
                let id = resolve(id, &allocated)?;
                allocated.push(None);
                let outcome = chunks
                    .trim(&id, start_offset, end_offset)
                    .map_err(chunk_error_to_edit_error)?;
                applied.push(DocOp::Trim {
                    id,
                    start_offset,
                    end_offset,
                    deleted_text: outcome.deleted_text,
                    new_text: outcome.new_text,
                });
            }
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::docs::record::DocRecord;
    use crate::backend::registry::OUTBOUND_QUEUE_CAPACITY;
    use crate::shared::crdt::Chunk;
    use chrono::Utc;
    use tokio::sync::{mpsc, watch};

    fn lseq(components: &[u16]) -> LseqId {
        LseqId::from_components(components.to_vec()).unwrap()
    }

    struct Fixture {
        dispatcher: EditDispatcher,
        registry: Arc<SessionRegistry>,
        cache: DocCache,
        doc_id: Uuid,
        channel_id: Uuid,
    }

    async fn fixture(chunks: &[(&[u16], &str)]) -> Fixture {
        let cache = DocCache::in_memory();
        let registry = Arc::new(SessionRegistry::new());
        let lanes = Arc::new(DocLanes::new());
        let doc_id = Uuid::new_v4();
        let channel_id = Uuid::new_v4();

        let chunk_list = ChunkList::from_chunks(
            chunks
                .iter()
                .map(|(c, t)| Chunk {
                    id: lseq(c),
                    text: t.to_string(),
                })
                .collect(),
        );
        let record = DocRecord {
            id: doc_id,
            channel_id,
            parent_id: None,
            name: "doc.txt".to_string(),
            is_directory: false,
            status: DocStatus::Normal,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: Version::initial(1),
            content: chunk_list.content(),
            chunks: chunk_list,
            op_log: Vec::new(),
            last_snapshot_at: None,
            lock_reason: None,
            dirty: false,
        };
        cache.put(&record).await;

        let dispatcher = EditDispatcher::new(cache.clone(), None, registry.clone(), lanes);
        Fixture {
            dispatcher,
            registry,
            cache,
            doc_id,
            channel_id,
        }
    }

    fn viewer(fixture: &Fixture) -> (Uuid, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (close_tx, _close_rx) = watch::channel(None);
        let session = fixture.registry.register(Uuid::new_v4(), tx, close_tx);
        fixture.registry.attach_channel(session, fixture.channel_id);
        fixture.registry.attach_doc(session, fixture.doc_id);
        (session, rx)
    }

    #[tokio::test]
    async fn test_batch_insert_into_empty_doc() {
        let fixture = fixture(&[]).await;
        let (session, mut rx) = viewer(&fixture);

        let applied = fixture
            .dispatcher
            .edit_doc_batch(
                session,
                fixture.doc_id,
                BatchEdit::Insert {
                    text: "hello".to_string(),
                    left_id: None,
                    right_id: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(applied.ops.len(), 1);
        assert_eq!(applied.version.to_string(), "1.0.1");
        let record = fixture.cache.get(fixture.doc_id).await.unwrap();
        assert_eq!(record.content, "hello");
        assert_eq!(record.op_log.len(), 1);
        assert!(record.dirty);

        // Originator receives the broadcast too.
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.event, "docOpBatch");
        assert_eq!(envelope.data["docId"], serde_json::json!(fixture.doc_id));
    }

    #[tokio::test]
    async fn test_single_insert_then_delete_round() {
        let fixture = fixture(&[]).await;
        let (session, mut rx) = viewer(&fixture);

        let applied = fixture
            .dispatcher
            .edit_doc(
                session,
                fixture.doc_id,
                EditIntent::Insert {
                    left_id: None,
                    right_id: None,
                    value: "x".to_string(),
                },
            )
            .await
            .unwrap();
        let inserted_id = match &applied.ops[0] {
            DocOp::Insert { id, .. } => id.clone(),
            other => panic!("expected insert, got {other:?}"),
        };
        assert_eq!(applied.version.to_string(), "1.0.1");

        let applied = fixture
            .dispatcher
            .edit_doc(
                session,
                fixture.doc_id,
                EditIntent::Delete { id: inserted_id },
            )
            .await
            .unwrap();
        assert_eq!(applied.version.to_string(), "1.0.2");

        let record = fixture.cache.get(fixture.doc_id).await.unwrap();
        assert_eq!(record.content, "");
        assert_eq!(record.op_log.len(), 2);
        assert_eq!(rx.try_recv().unwrap().event, "docOp");
        assert_eq!(rx.try_recv().unwrap().event, "docOp");
    }

    #[tokio::test]
    async fn test_insert_value_must_be_single_character() {
        let fixture = fixture(&[]).await;
        let (session, _rx) = viewer(&fixture);

        let err = fixture
            .dispatcher
            .edit_doc(
                session,
                fixture.doc_id,
                EditIntent::Insert {
                    left_id: None,
                    right_id: None,
                    value: "xy".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::Validation(_)));
    }

    #[tokio::test]
    async fn test_edit_requires_viewing() {
        let fixture = fixture(&[]).await;
        let (tx, _rx) = mpsc::channel(8);
        let (close_tx, _close_rx) = watch::channel(None);
        let stranger = fixture.registry.register(Uuid::new_v4(), tx, close_tx);

        let err = fixture
            .dispatcher
            .edit_doc_batch(
                stranger,
                fixture.doc_id,
                BatchEdit::Insert {
                    text: "nope".to_string(),
                    left_id: None,
                    right_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::NotViewing));
    }

    #[tokio::test]
    async fn test_locked_doc_rejects_edit() {
        let fixture = fixture(&[(&[10], "hello")]).await;
        let (session, _rx) = viewer(&fixture);

        let mut record = fixture.cache.get(fixture.doc_id).await.unwrap();
        record.status = DocStatus::Locked;
        record.lock_reason = Some("snapshot in progress".to_string());
        fixture.cache.put(&record).await;

        let err = fixture
            .dispatcher
            .edit_doc(
                session,
                fixture.doc_id,
                EditIntent::Delete { id: lseq(&[10]) },
            )
            .await
            .unwrap_err();
        match err {
            EditError::Rejected { status, reason } => {
                assert_eq!(status, DocStatus::Locked);
                assert_eq!(reason.as_deref(), Some("snapshot in progress"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        // Log untouched.
        let record = fixture.cache.get(fixture.doc_id).await.unwrap();
        assert!(record.op_log.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_delete_reports_already_deleted() {
        let fixture = fixture(&[(&[10], "hello")]).await;
        let (session, _rx) = viewer(&fixture);

        let first = fixture
            .dispatcher
            .edit_doc(
                session,
                fixture.doc_id,
                EditIntent::Delete { id: lseq(&[10]) },
            )
            .await
            .unwrap();
        assert!(!first.already_deleted);

        let second = fixture
            .dispatcher
            .edit_doc(
                session,
                fixture.doc_id,
                EditIntent::Delete { id: lseq(&[10]) },
            )
            .await
            .unwrap();
        assert!(second.already_deleted);
        assert!(second.ops.is_empty());

        // One log entry, one version bump.
        let record = fixture.cache.get(fixture.doc_id).await.unwrap();
        assert_eq!(record.op_log.len(), 1);
        assert_eq!(record.version.to_string(), "1.0.1");
    }

    #[tokio::test]
    async fn test_split_insert_batch() {
        let fixture = fixture(&[(&[10], "abcdef")]).await;
        let (session, _rx) = viewer(&fixture);

        let applied = fixture
            .dispatcher
            .edit_doc_batch(
                session,
                fixture.doc_id,
                BatchEdit::SplitInsert {
                    target_id: lseq(&[10]),
                    offset: 3,
                    text: "Z".to_string(),
                },
            )
            .await
            .unwrap();

        let record = fixture.cache.get(fixture.doc_id).await.unwrap();
        assert_eq!(record.content, "abcZdef");
        assert_eq!(record.chunks.len(), 3);
        match &applied.ops[0] {
            DocOp::Split {
                insert_id, right_id, ..
            } => {
                assert!(lseq(&[10]) < *insert_id);
                assert!(*insert_id < *right_id.as_ref().unwrap());
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_op_sequence_with_temp_references() {
        let fixture = fixture(&[]).await;
        let (session, _rx) = viewer(&fixture);

        let ops = vec![
            BatchOp::Insert {
                text: "ab".to_string(),
                left_id: None,
                right_id: None,
            },
            BatchOp::Split {
                target_id: ChunkRef::Temp(0),
                offset: 1,
                text: "X".to_string(),
            },
            BatchOp::Trim {
                id: ChunkRef::Temp(1),
                start_offset: 0,
                end_offset: 1,
            },
        ];
        let applied = fixture
            .dispatcher
            .edit_doc_batch(session, fixture.doc_id, BatchEdit::Ops { ops })
            .await
            .unwrap();

        // Insert "ab", split to "aXb", trim the X back out.
        assert_eq!(applied.ops.len(), 3);
        assert_eq!(applied.version.to_string(), "1.0.3");
        let record = fixture.cache.get(fixture.doc_id).await.unwrap();
        assert_eq!(record.content, "ab");
    }

    #[tokio::test]
    async fn test_forward_temp_reference_fails_without_mutation() {
        let fixture = fixture(&[(&[10], "keep")]).await;
        let (session, _rx) = viewer(&fixture);

        let ops = vec![BatchOp::Delete {
            id: ChunkRef::Temp(0),
        }];
        let err = fixture
            .dispatcher
            .edit_doc_batch(session, fixture.doc_id, BatchEdit::Ops { ops })
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::Validation(_)));

        let record = fixture.cache.get(fixture.doc_id).await.unwrap();
        assert_eq!(record.content, "keep");
        assert!(record.op_log.is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_record_untouched() {
        let fixture = fixture(&[(&[10], "abc")]).await;
        let (session, _rx) = viewer(&fixture);

        let ops = vec![
            BatchOp::Insert {
                text: "Z".to_string(),
                left_id: Some(ChunkRef::Id(lseq(&[10]))),
                right_id: None,
            },
            // Out-of-bounds trim fails after the insert succeeded.
            BatchOp::Trim {
                id: ChunkRef::Id(lseq(&[10])),
                start_offset: 0,
                end_offset: 99,
            },
        ];
        let err = fixture
            .dispatcher
            .edit_doc_batch(session, fixture.doc_id, BatchEdit::Ops { ops })
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::Validation(_)));

        let record = fixture.cache.get(fixture.doc_id).await.unwrap();
        assert_eq!(record.content, "abc");
        assert_eq!(record.version.to_string(), "1.0.0");
    }

    #[tokio::test]
    async fn test_stale_reference_surfaces_not_corruption() {
        let fixture = fixture(&[(&[10], "abc")]).await;
        let (session, _rx) = viewer(&fixture);

        let err = fixture
            .dispatcher
            .edit_doc_batch(
                session,
                fixture.doc_id,
                BatchEdit::SplitInsert {
                    target_id: lseq(&[99]),
                    offset: 0,
                    text: "X".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::Stale(_)));
    }

    #[tokio::test]
    async fn test_concurrent_same_gap_inserts_converge() {
        let fixture = fixture(&[(&[10], "hello")]).await;
        let (session_a, _rx_a) = viewer(&fixture);
        let (session_b, _rx_b) = viewer(&fixture);

        let edit = |session| {
            fixture.dispatcher.edit_doc_batch(
                session,
                fixture.doc_id,
                BatchEdit::Insert {
                    text: "X".to_string(),
                    left_id: Some(lseq(&[10])),
                    right_id: None,
                },
            )
        };
        let (a, b) = tokio::join!(edit(session_a), edit(session_b));
        let a = a.unwrap();
        let b = b.unwrap();

        let id_of = |applied: &AppliedEdit| match &applied.ops[0] {
            DocOp::Insert { id, .. } => id.clone(),
            other => panic!("expected insert, got {other:?}"),
        };
        assert_ne!(id_of(&a), id_of(&b));

        let record = fixture.cache.get(fixture.doc_id).await.unwrap();
        assert_eq!(record.content.len(), 7);
        assert!(record.chunks.is_strictly_ordered());
        assert_eq!(record.version.to_string(), "1.0.2");
    }

    #[tokio::test]
    async fn test_unknown_doc_is_unavailable_without_store() {
        let fixture = fixture(&[]).await;
        let (session, _rx) = viewer(&fixture);
        let other_doc = Uuid::new_v4();
        // Attach the viewer to the unknown doc so the viewing check
        // passes and materialization is what fails.
        fixture.registry.attach_doc(session, other_doc);

        let err = fixture
            .dispatcher
            .edit_doc_batch(
                session,
                other_doc,
                BatchEdit::Insert {
                    text: "x".to_string(),
                    left_id: None,
                    right_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::Unavailable));
    }
}
