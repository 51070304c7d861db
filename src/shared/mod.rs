//! Shared Module
//!
//! Types used on both sides of the wire: the message envelope, edit
//! intents, and the chunk CRDT model (identifiers, chunks, op log,
//! version clock). Everything here is serde-serializable; the JSON
//! renderings are the protocol.

/// Chunk CRDT model
pub mod crdt;

/// Wire envelope and event names
pub mod envelope;

/// Shared error types
pub mod error;

/// Edit intents and batch shapes
pub mod intent;

/// Re-export commonly used types for convenience
pub use crdt::{Chunk, ChunkList, DocOp, LseqId, OpLogEntry, Version};
pub use envelope::Envelope;
pub use error::SharedError;
pub use intent::{BatchEdit, BatchOp, ChunkRef, EditIntent};
