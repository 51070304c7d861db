/**
 * Chunk Store
 *
 * This module holds the in-memory ordered sequence of text chunks that
 * backs one open document. A chunk is a maximal contiguous run of
 * characters carrying a single LSEQ identifier; the concatenation of chunk
 * texts in identifier order is the rendered document content.
 *
 * Mutations come in four shapes: insert between two neighbors, split a
 * chunk and insert inside it, delete a chunk, and trim a character range
 * out of a chunk. Chunks never stay empty; a trim or split that empties
 * one removes it.
 */
use serde::{Deserialize, Serialize};

use super::lseq::{between, LseqId};

/// One contiguous run of characters with a single identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position identifier; unique within the document.
    pub id: LseqId,
    /// Chunk text; never empty while the chunk is present.
    pub text: String,
}

/// Result of a chunk deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The chunk was present and has been removed; carries its text.
    Deleted(String),
    /// The chunk was already absent. Not an error: a duplicate delete
    /// arriving over the wire must be answered, not raised.
    AlreadyDeleted,
}

/// Result of a successful split-and-insert.
///
/// Carries the identifiers the store allocated so the caller can build the
/// matching op-log entry and echo authoritative ids to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    /// Text kept under the original target id (may be empty when the
    /// split happened at offset 0, in which case the target was removed).
    pub left_text: String,
    /// Identifier allocated for the inserted text.
    pub insert_id: LseqId,
    /// Identifier allocated for the right remnant, when one exists.
    pub right_id: Option<LseqId>,
    /// Text of the right remnant (empty when `right_id` is `None`).
    pub right_text: String,
}

/// Result of a trim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimOutcome {
    /// The characters removed from the chunk.
    pub deleted_text: String,
    /// The text remaining in the chunk; empty means the chunk was removed.
    pub new_text: String,
}

/// Failures surfaced by chunk mutations.
///
/// These are protocol-visible conditions, not corruption: a stale
/// identifier or an out-of-range offset from a lagging client must map to
/// an explicit rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk {0} not found")]
    NotFound(LseqId),
    #[error("duplicate chunk id {0}")]
    DuplicateId(LseqId),
    #[error("offset {offset} out of bounds for chunk of length {len}")]
    OffsetOutOfBounds { offset: usize, len: usize },
    #[error("empty text")]
    EmptyText,
}

/// The ordered chunk sequence for one document.
///
/// The vector is kept strictly increasing by id; id lookups are binary
/// searches and offset lookups walk the sequence summing lengths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkList(Vec<Chunk>);

impl ChunkList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Adopt an already-ordered chunk sequence (rehydration path).
    /// Out-of-order or duplicate input is repaired by re-sorting; the
    /// durable store is allowed to hand back rows written by older
    /// revisions.
    pub fn from_chunks(mut chunks: Vec<Chunk>) -> Self {
        chunks.retain(|c| !c.text.is_empty());
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        chunks.dedup_by(|a, b| a.id == b.id);
        Self(chunks)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.0.iter()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.0
    }

    /// The rendered document content.
    pub fn content(&self) -> String {
        self.0.iter().map(|c| c.text.as_str()).collect()
    }

    /// Total character count across all chunks.
    pub fn char_len(&self) -> usize {
        self.0.iter().map(|c| c.text.chars().count()).sum()
    }

    fn position_of(&self, id: &LseqId) -> Result<usize, usize> {
        self.0.binary_search_by(|c| c.id.cmp(id))
    }

    /// Look up a chunk by id.
    pub fn get(&self, id: &LseqId) -> Option<&Chunk> {
        self.position_of(id).ok().map(|i| &self.0[i])
    }

    /// Whether a chunk with this id is present.
    pub fn contains(&self, id: &LseqId) -> bool {
        self.position_of(id).is_ok()
    }

    /// The id of the chunk immediately after `id`, if any.
    pub fn next_id(&self, id: &LseqId) -> Option<LseqId> {
        let index = match self.position_of(id) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        self.0.get(index).map(|c| c.id.clone())
    }

    /// Insert a chunk with a caller-supplied id (replay and batch paths).
    pub fn insert_with_id(&mut self, id: LseqId, text: String) -> Result<(), ChunkError> {
        if text.is_empty() {
            return Err(ChunkError::EmptyText);
        }
        match self.position_of(&id) {
            Ok(_) => Err(ChunkError::DuplicateId(id)),
            Err(index) => {
                self.0.insert(index, Chunk { id, text });
                Ok(())
            }
        }
    }

    /// Allocate an id between two neighbors and insert a chunk there.
    ///
    /// Both neighbors are optional; absent neighbors mean the document
    /// boundary on that side. Returns the allocated id.
    pub fn insert_between(
        &mut self,
        left_id: Option<&LseqId>,
        right_id: Option<&LseqId>,
        text: String,
    ) -> Result<LseqId, ChunkError> {
        if text.is_empty() {
            return Err(ChunkError::EmptyText);
        }
        if let Some(id) = left_id {
            if !self.contains(id) {
                return Err(ChunkError::NotFound(id.clone()));
            }
        }
        if let Some(id) = right_id {
            if !self.contains(id) {
                return Err(ChunkError::NotFound(id.clone()));
            }
        }
        let id = between(left_id, right_id);
        self.insert_with_id(id.clone(), text)?;
        Ok(id)
    }

    /// Split the chunk `target_id` at `offset` (characters) and insert
    /// `text` in the gap.
    ///
    /// The left remnant keeps the original target id so identifiers held
    /// by other clients keep pointing at the original position; the
    /// inserted text and the right remnant get fresh ids allocated between
    /// the target and its successor. Empty remnants are dropped rather
    /// than kept as empty chunks.
    pub fn split_and_insert(
        &mut self,
        target_id: &LseqId,
        offset: usize,
        text: String,
    ) -> Result<SplitOutcome, ChunkError> {
        if text.is_empty() {
            return Err(ChunkError::EmptyText);
        }
        let index = self
            .position_of(target_id)
            .map_err(|_| ChunkError::NotFound(target_id.clone()))?;

        let target_chars = self.0[index].text.chars().count();
        if offset > target_chars {
            return Err(ChunkError::OffsetOutOfBounds {
                offset,
                len: target_chars,
            });
        }

        let (left_text, right_text) = split_at_chars(&self.0[index].text, offset);
        let successor = self.0.get(index + 1).map(|c| c.id.clone());

        let insert_id = between(Some(target_id), successor.as_ref());
        let right_id = if right_text.is_empty() {
            None
        } else {
            Some(between(Some(&insert_id), successor.as_ref()))
        };

        self.apply_split(
            index,
            &left_text,
            insert_id.clone(),
            text,
            right_id.clone(),
            &right_text,
        );

        Ok(SplitOutcome {
            left_text,
            insert_id,
            right_id,
            right_text,
        })
    }

    /// Splice a split into the vector with ids already decided.
    /// Shared by the live path and replay.
    fn apply_split(
        &mut self,
        index: usize,
        left_text: &str,
        insert_id: LseqId,
        insert_text: String,
        right_id: Option<LseqId>,
        right_text: &str,
    ) {
        let target_id = self.0[index].id.clone();
        let mut replacement = Vec::with_capacity(3);
        if !left_text.is_empty() {
            replacement.push(Chunk {
                id: target_id,
                text: left_text.to_string(),
            });
        }
        replacement.push(Chunk {
            id: insert_id,
            text: insert_text,
        });
        if let (Some(id), false) = (right_id, right_text.is_empty()) {
            replacement.push(Chunk {
                id,
                text: right_text.to_string(),
            });
        }
        self.0.splice(index..index + 1, replacement);
    }

    /// Replay a split whose ids were allocated elsewhere.
    ///
    /// A missing target is skipped (the log may contain entries that no
    /// longer apply); a duplicate insert id is refused.
    pub fn replay_split(
        &mut self,
        target_id: &LseqId,
        left_text: &str,
        insert_id: LseqId,
        insert_text: String,
        right_id: Option<LseqId>,
        right_text: &str,
    ) -> Result<bool, ChunkError> {
        let index = match self.position_of(target_id) {
            Ok(i) => i,
            Err(_) => return Ok(false),
        };
        if self.contains(&insert_id) {
            return Err(ChunkError::DuplicateId(insert_id));
        }
        self.apply_split(index, left_text, insert_id, insert_text, right_id, right_text);
        Ok(true)
    }

    /// Remove the chunk with `id`. Absence is reported, not raised.
    pub fn delete(&mut self, id: &LseqId) -> DeleteOutcome {
        match self.position_of(id) {
            Ok(index) => DeleteOutcome::Deleted(self.0.remove(index).text),
            Err(_) => DeleteOutcome::AlreadyDeleted,
        }
    }

    /// Remove characters `[start_offset, end_offset)` from the chunk with
    /// `id`. A chunk emptied by the trim is removed from the sequence.
    pub fn trim(
        &mut self,
        id: &LseqId,
        start_offset: usize,
        end_offset: usize,
    ) -> Result<TrimOutcome, ChunkError> {
        let index = self
            .position_of(id)
            .map_err(|_| ChunkError::NotFound(id.clone()))?;
        let chars = self.0[index].text.chars().count();
        if start_offset > end_offset || end_offset > chars {
            return Err(ChunkError::OffsetOutOfBounds {
                offset: end_offset,
                len: chars,
            });
        }

        let text = &self.0[index].text;
        let (head, rest) = split_at_chars(text, start_offset);
        let (deleted_text, tail) = split_at_chars(&rest, end_offset - start_offset);
        let new_text = format!("{head}{tail}");

        if new_text.is_empty() {
            self.0.remove(index);
        } else {
            self.0[index].text = new_text.clone();
        }

        Ok(TrimOutcome {
            deleted_text,
            new_text,
        })
    }

    /// Verify the strict-ordering invariant. Test support.
    #[doc(hidden)]
    pub fn is_strictly_ordered(&self) -> bool {
        self.0.windows(2).all(|w| w[0].id < w[1].id)
    }
}

/// Split a string at a character offset (not a byte offset); edits address
/// characters as users see them.
fn split_at_chars(s: &str, offset: usize) -> (String, String) {
    let byte_index = s
        .char_indices()
        .nth(offset)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (s[..byte_index].to_string(), s[byte_index..].to_string())
}
