/**
 * Document Records
 *
 * The in-memory/hot-tier shape of one document: metadata, the chunk
 * list, the op log since the last snapshot, the version clock, and the
 * rendered content kept alongside for consumers that do not replay.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::shared::crdt::{ChunkList, OpLogEntry, Version};

/// Runtime status of a document.
///
/// `Locked` is transient: it exists in the cache while a snapshot or sync
/// is cutting, and is never written to the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum DocStatus {
    Normal,
    Deleted,
    Locked,
}

impl From<DocStatus> for i16 {
    fn from(status: DocStatus) -> i16 {
        match status {
            DocStatus::Normal => 0,
            DocStatus::Deleted => 1,
            DocStatus::Locked => 2,
        }
    }
}

impl TryFrom<i16> for DocStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DocStatus::Normal),
            1 => Ok(DocStatus::Deleted),
            2 => Ok(DocStatus::Locked),
            other => Err(format!("unknown document status {other}")),
        }
    }
}

/// A document as held in the hot tier while it has viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocRecord {
    pub id: Uuid,
    pub channel_id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub is_directory: bool,
    pub status: DocStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
    /// Rendered content, kept equal to the chunk concatenation.
    pub content: String,
    pub chunks: ChunkList,
    pub op_log: Vec<OpLogEntry>,
    #[serde(default)]
    pub last_snapshot_at: Option<DateTime<Utc>>,
    /// Present while the document is locked.
    #[serde(default)]
    pub lock_reason: Option<String>,
    /// Set when the cached version has advanced past the stored one;
    /// cleared by write-through.
    #[serde(default)]
    pub dirty: bool,
}

impl DocRecord {
    /// Re-derive the rendered content from the chunk list after a
    /// mutation.
    pub fn refresh_content(&mut self) {
        self.content = self.chunks.content();
        self.updated_at = Utc::now();
    }

    /// The metadata-only view used in listings and doc-level broadcasts.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "channelId": self.channel_id,
            "parentId": self.parent_id,
            "name": self.name,
            "isDirectory": self.is_directory,
            "status": self.status,
            "version": self.version,
            "createdBy": self.created_by,
            "updatedAt": self.updated_at,
        })
    }
}
