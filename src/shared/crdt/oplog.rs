/**
 * Operation Log and Replay
 *
 * Append-only log of chunk-level mutations since the last snapshot. Each
 * entry carries exactly the information needed to re-apply it onto the
 * pre-state with the identifiers the server originally allocated, plus the
 * originating user and a wall-clock timestamp (advisory only; ordering is
 * the log order).
 *
 * Replay is total: an entry referencing a chunk that is absent from the
 * list is skipped rather than raised, so a log that contains apparent
 * no-ops (duplicate deletes, stale splits) still replays cleanly.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chunk::{ChunkList, DeleteOutcome};
use super::lseq::LseqId;

/// The chunk-level mutation carried by one log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DocOp {
    /// A chunk inserted between two neighbors.
    #[serde(rename_all = "camelCase")]
    Insert {
        id: LseqId,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        left_id: Option<LseqId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        right_id: Option<LseqId>,
    },
    /// A chunk split with text inserted in the gap. The left remnant keeps
    /// the target id; empty remnant texts mean that remnant was dropped.
    #[serde(rename_all = "camelCase")]
    Split {
        target_id: LseqId,
        offset: usize,
        left_text: String,
        insert_id: LseqId,
        insert_text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        right_id: Option<LseqId>,
        right_text: String,
    },
    /// A chunk removed. The text is retained so a replayed log stays
    /// readable when audited.
    #[serde(rename_all = "camelCase")]
    Delete { id: LseqId, text: String },
    /// A character range removed from inside a chunk.
    #[serde(rename_all = "camelCase")]
    Trim {
        id: LseqId,
        start_offset: usize,
        end_offset: usize,
        deleted_text: String,
        new_text: String,
    },
}

/// One op-log entry: the mutation plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpLogEntry {
    pub user_id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub op: DocOp,
}

impl OpLogEntry {
    pub fn new(user_id: Uuid, op: DocOp) -> Self {
        Self {
            user_id,
            at: Utc::now(),
            op,
        }
    }
}

/// Apply one logged operation onto a chunk list.
///
/// Returns `true` when the operation changed the list, `false` when it was
/// skipped because its referenced chunk is absent. Identifiers come from
/// the entry; nothing is re-allocated here.
pub fn apply_op(list: &mut ChunkList, op: &DocOp) -> bool {
    match op {
        DocOp::Insert { id, text, .. } => list.insert_with_id(id.clone(), text.clone()).is_ok(),
        DocOp::Split {
            target_id,
            left_text,
            insert_id,
            insert_text,
            right_id,
            right_text,
            ..
        } => list
            .replay_split(
                target_id,
                left_text,
                insert_id.clone(),
                insert_text.clone(),
                right_id.clone(),
                right_text,
            )
            .unwrap_or(false),
        DocOp::Delete { id, .. } => matches!(list.delete(id), DeleteOutcome::Deleted(_)),
        DocOp::Trim {
            id,
            start_offset,
            end_offset,
            ..
        } => list.trim(id, *start_offset, *end_offset).is_ok(),
    }
}

/// Replay a log onto a snapshot chunk list, in order. Returns the number
/// of entries that applied (skipped entries are not an error).
pub fn replay(snapshot: &mut ChunkList, entries: &[OpLogEntry]) -> usize {
    entries
        .iter()
        .filter(|entry| apply_op(snapshot, &entry.op))
        .count()
}

/// Whether a log looks like the legacy character-level format: every
/// insert carries exactly one character and no splits or trims appear.
/// Older revisions persisted one chunk per keystroke; rehydration
/// coalesces those into runs.
pub fn is_character_level(entries: &[OpLogEntry]) -> bool {
    !entries.is_empty()
        && entries.iter().all(|entry| match &entry.op {
            DocOp::Insert { text, .. } => text.chars().count() == 1,
            DocOp::Delete { .. } => true,
            DocOp::Split { .. } | DocOp::Trim { .. } => false,
        })
}

/// Merge an ordered chunk sequence into one run keeping the head id.
/// Used when rehydrating legacy character-level documents, where every
/// keystroke produced its own chunk.
pub fn coalesce(list: &ChunkList) -> ChunkList {
    let mut iter = list.iter();
    let Some(head) = iter.next() else {
        return ChunkList::new();
    };
    let mut merged = head.clone();
    for chunk in iter {
        merged.text.push_str(&chunk.text);
    }
    ChunkList::from_chunks(vec![merged])
}
