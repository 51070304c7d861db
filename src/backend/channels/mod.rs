//! Channels: named groups of users sharing a set of documents.

/// Channel and membership database operations
pub mod db;

pub use db::Channel;
