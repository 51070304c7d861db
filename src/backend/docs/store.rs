/**
 * Durable Store Adapter
 *
 * Database operations for document rows. The durable store holds the
 * authoritative row per document; the hot tier mutates freely between
 * write-throughs, and every write here is gated on strict version
 * advance so replayed or stale writers can never roll a row back.
 */
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::backend::docs::record::{DocRecord, DocStatus};
use crate::shared::crdt::{self, between, Chunk, ChunkList, OpLogEntry, Version};

const DOC_COLUMNS: &str = "id, channel_id, parent_id, name, content, chunks, op_log, version, \
     is_directory, status, created_by, last_snapshot_at, created_at, updated_at";

fn decode<T: serde::de::DeserializeOwned>(
    column: &'static str,
    value: Value,
) -> Result<T, sqlx::Error> {
    serde_json::from_value(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<DocRecord, sqlx::Error> {
    let chunks: ChunkList = decode("chunks", row.get::<Value, _>("chunks"))?;
    let op_log: Vec<OpLogEntry> = decode("op_log", row.get::<Value, _>("op_log"))?;
    let version: Version = decode("version", row.get::<Value, _>("version"))?;
    let status = DocStatus::try_from(row.get::<i16, _>("status")).map_err(|e| {
        sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: e.into(),
        }
    })?;

    Ok(DocRecord {
        id: row.get("id"),
        channel_id: row.get("channel_id"),
        parent_id: row.get("parent_id"),
        name: row.get("name"),
        is_directory: row.get("is_directory"),
        status,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version,
        content: row.get("content"),
        chunks,
        op_log,
        last_snapshot_at: row.get("last_snapshot_at"),
        lock_reason: None,
        dirty: false,
    })
}

fn json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Load the full row, including soft-deleted rows (the caller needs the
/// status to know to evict).
pub async fn load_doc(pool: &PgPool, id: Uuid) -> Result<Option<DocRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {DOC_COLUMNS} FROM document_data WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_record).transpose()
}

/// Create a document row. The caller has already checked membership;
/// uniqueness of `(channel_id, parent_id, name)` is enforced here by the
/// database.
pub async fn create_doc(
    pool: &PgPool,
    channel_id: Uuid,
    parent_id: Option<Uuid>,
    name: &str,
    is_directory: bool,
    created_by: Uuid,
    service_version: u64,
) -> Result<DocRecord, sqlx::Error> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let version = Version::initial(service_version);

    sqlx::query(
        r#"
        INSERT INTO document_data (id, channel_id, parent_id, name, content, chunks, op_log, version, is_directory, status, created_by, last_snapshot_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, '', $5, $6, $7, $8, 0, $9, NULL, $10, $10)
        "#,
    )
    .bind(id)
    .bind(channel_id)
    .bind(parent_id)
    .bind(name)
    .bind(json(&ChunkList::new()))
    .bind(json(&Vec::<OpLogEntry>::new()))
    .bind(json(&version))
    .bind(is_directory)
    .bind(created_by)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(DocRecord {
        id,
        channel_id,
        parent_id,
        name: name.to_string(),
        is_directory,
        status: DocStatus::Normal,
        created_by,
        created_at: now,
        updated_at: now,
        version,
        content: String::new(),
        chunks: ChunkList::new(),
        op_log: Vec::new(),
        last_snapshot_at: None,
        lock_reason: None,
        dirty: false,
    })
}

/// Write the cached state through to the durable row.
///
/// The write happens only when the cached version strictly exceeds the
/// stored version; returns whether a row was updated. The compare runs
/// inside a row-locked transaction so two write-throughs cannot
/// interleave.
pub async fn write_through(pool: &PgPool, record: &DocRecord) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let stored: Option<Value> =
        sqlx::query("SELECT version FROM document_data WHERE id = $1 FOR UPDATE")
            .bind(record.id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.get("version"));

    let Some(stored) = stored else {
        tx.rollback().await?;
        return Ok(false);
    };
    let stored_version: Version = serde_json::from_value(stored).unwrap_or_default();
    if record.version <= stored_version {
        tx.rollback().await?;
        return Ok(false);
    }

    // LOCKED never reaches a row; it is a cache-only state.
    let persisted_status = match record.status {
        DocStatus::Deleted => DocStatus::Deleted,
        DocStatus::Normal | DocStatus::Locked => DocStatus::Normal,
    };

    sqlx::query(
        r#"
        UPDATE document_data
        SET content = $1, chunks = $2, op_log = $3, version = $4, status = $5, updated_at = $6
        WHERE id = $7
        "#,
    )
    .bind(&record.content)
    .bind(json(&record.chunks))
    .bind(json(&record.op_log))
    .bind(json(&record.version))
    .bind(i16::from(persisted_status))
    .bind(record.updated_at)
    .bind(record.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Materialize a snapshot: adopt the chunk list, truncate the op log and
/// stamp the snapshot time. The caller passes the already-bumped version.
pub async fn snapshot(
    pool: &PgPool,
    id: Uuid,
    content: &str,
    chunks: &ChunkList,
    version: Version,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE document_data
        SET content = $1, chunks = $2, op_log = $3, version = $4, last_snapshot_at = $5, updated_at = $5
        WHERE id = $6
        "#,
    )
    .bind(content)
    .bind(json(chunks))
    .bind(json(&Vec::<OpLogEntry>::new()))
    .bind(json(&version))
    .bind(at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a document deleted. The row stays for history; the cache entry is
/// the caller's to evict.
pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE document_data SET status = 1, updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Rename and/or move a document. Uniqueness of
/// `(channel_id, parent_id, name)` is enforced by the database constraint.
pub async fn rename_move(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    parent_id: Option<Option<Uuid>>,
) -> Result<Option<DocRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE document_data
        SET name = COALESCE($1, name),
            parent_id = CASE WHEN $2 THEN $3 ELSE parent_id END,
            updated_at = $4
        WHERE id = $5 AND status <> 1
        RETURNING {DOC_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(parent_id.is_some())
    .bind(parent_id.flatten())
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_record).transpose()
}

/// All live documents of a channel, directories first then by name.
pub async fn list_docs(pool: &PgPool, channel_id: Uuid) -> Result<Vec<DocRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {DOC_COLUMNS} FROM document_data
        WHERE channel_id = $1 AND status <> 1
        ORDER BY is_directory DESC, name ASC
        "#
    ))
    .bind(channel_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

/// Every live document id in the deployment; startup prefetch input.
pub async fn list_all_live_ids(pool: &PgPool) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query("SELECT id FROM document_data WHERE status <> 1")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("id")).collect())
}

/// Reconstruct the chunk list for a loaded row.
///
/// Priority order: a persisted chunk array is adopted directly; a legacy
/// character-level op log is replayed and coalesced into one run; bare
/// content becomes a single chunk under a fresh identifier.
pub fn rehydrate(mut record: DocRecord) -> DocRecord {
    if record.chunks.is_empty() {
        if crdt::is_character_level(&record.op_log) {
            let mut replayed = ChunkList::new();
            crdt::replay(&mut replayed, &record.op_log);
            record.chunks = crdt::coalesce(&replayed);
            record.op_log.clear();
        } else if !record.content.is_empty() {
            record.chunks = ChunkList::from_chunks(vec![Chunk {
                id: between(None, None),
                text: record.content.clone(),
            }]);
        }
    }
    record.content = record.chunks.content();
    record
}
