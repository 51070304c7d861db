/**
 * Edit Intents
 *
 * Wire shapes for document edits. `editDoc` carries a single-character
 * intent (the legacy per-keystroke path); `editDocBatch` carries one of
 * three grouped shapes: a bulk inter-chunk insert, an in-chunk split
 * insert, or a sequence of primitive operations.
 *
 * Inside a primitive sequence, an operation may reference an id allocated
 * by an earlier operation in the same batch through the `temp_N`
 * placeholder, where `N` is the index of the allocating operation. The
 * dispatcher resolves placeholders against the ids it actually allocated
 * and echoes the authoritative ids back in the broadcast.
 */
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::shared::crdt::LseqId;

/// Single-character edit intent (`editDoc`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "camelCase")]
pub enum EditIntent {
    /// Insert exactly one character between two neighbors.
    #[serde(rename_all = "camelCase")]
    Insert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        left_id: Option<LseqId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right_id: Option<LseqId>,
        value: String,
    },
    /// Delete one chunk.
    #[serde(rename_all = "camelCase")]
    Delete { id: LseqId },
}

/// Grouped edit shapes (`editDocBatch`).
///
/// Untagged: the shape is recognized by its fields, the way the wire
/// format presents it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEdit {
    /// In-chunk split insert: place `text` inside the chunk `target_id`
    /// at `offset`.
    #[serde(rename_all = "camelCase")]
    SplitInsert {
        target_id: LseqId,
        offset: usize,
        text: String,
    },
    /// Bulk inter-chunk insert: place `text` as one chunk between two
    /// neighbors.
    #[serde(rename_all = "camelCase")]
    Insert {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        left_id: Option<LseqId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right_id: Option<LseqId>,
    },
    /// Sequence of primitive operations with placeholder resolution.
    Ops { ops: Vec<BatchOp> },
}

/// Reference to a chunk id inside a primitive sequence: either a concrete
/// id or `temp_N`, the id allocated by operation `N` of the same batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkRef {
    Id(LseqId),
    Temp(usize),
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkRef::Id(id) => write!(f, "{id}"),
            ChunkRef::Temp(n) => write!(f, "temp_{n}"),
        }
    }
}

/// Error parsing a chunk reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid chunk reference: {0}")]
pub struct ParseChunkRefError(String);

impl FromStr for ChunkRef {
    type Err = ParseChunkRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(index) = s.strip_prefix("temp_") {
            return index
                .parse::<usize>()
                .map(ChunkRef::Temp)
                .map_err(|_| ParseChunkRefError(s.to_string()));
        }
        s.parse::<LseqId>()
            .map(ChunkRef::Id)
            .map_err(|_| ParseChunkRefError(s.to_string()))
    }
}

impl Serialize for ChunkRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChunkRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One primitive operation inside a batch sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum BatchOp {
    #[serde(rename_all = "camelCase")]
    Insert {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        left_id: Option<ChunkRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right_id: Option<ChunkRef>,
    },
    #[serde(rename_all = "camelCase")]
    Split {
        target_id: ChunkRef,
        offset: usize,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Delete { id: ChunkRef },
    #[serde(rename_all = "camelCase")]
    Trim {
        id: ChunkRef,
        start_offset: usize,
        end_offset: usize,
    },
}
