//! WebSocket surface: upgrade handshake, per-connection read/write
//! tasks, and event dispatch.

/// Connection handling (upgrade, auth, read/write tasks)
pub mod connection;

/// Typed event handlers
pub mod events;

/// Request payload shapes
pub mod types;

pub use connection::ws_handler;
