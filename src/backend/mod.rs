//! Backend Module
//!
//! The server side of xfdocs: HTTP surface (auth + socket upgrade),
//! session registry and room fan-out, the edit dispatcher over the
//! two-tier persistence pipeline, and lifecycle control.

/// Authentication (tokens, users, OAuth exchange)
pub mod auth;

/// Channel CRUD
pub mod channels;

/// Documents: cache, store, dispatcher, lifecycle
pub mod docs;

/// Backend error taxonomy
pub mod error;

/// Session registry and room broadcast
pub mod registry;

/// HTTP routes
pub mod routes;

/// Configuration, state and initialization
pub mod server;

/// WebSocket surface
pub mod ws;
