//! Chunk CRDT Model
//!
//! The collaborative text model: LSEQ identifiers give chunks a dense
//! total order, the chunk store holds the ordered sequence for one open
//! document, the op log records chunk-level mutations for replay, and the
//! version clock tracks `service.snapshot.log` progress.
//!
//! Identifiers are allocated only by the server, which is the total-order
//! authority; the log format is still replay-shaped so convergence holds
//! for any dependency-preserving permutation of entries.

/// LSEQ identifier allocation
pub mod lseq;

/// Ordered chunk sequence per document
pub mod chunk;

/// Operation log and replay
pub mod oplog;

/// Three-part version clock
pub mod version;

pub use chunk::{Chunk, ChunkError, ChunkList, DeleteOutcome, SplitOutcome, TrimOutcome};
pub use lseq::{between, LseqId};
pub use oplog::{apply_op, coalesce, is_character_level, replay, DocOp, OpLogEntry};
pub use version::Version;
