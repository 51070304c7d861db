/**
 * Backend Error Types
 *
 * The server-side failure taxonomy. Every handler returns a tagged
 * outcome built from these kinds; nothing in the event path panics or
 * raises past the wire layer.
 *
 * # Policy per kind
 *
 * - Validation / Authorization / NotFound / Conflict: answered with a
 *   `systemmessage` envelope, no side effects.
 * - TransientExternal: the hot tier or durable store did not answer;
 *   cache-resident reads continue, writes wait for the next snapshot or
 *   sync.
 * - Protocol: malformed envelope or payload, answered with an `error`
 *   envelope, connection stays open.
 */
use thiserror::Error;

use crate::shared::SharedError;

/// Server-side failure kinds.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Payload failed validation (missing field, out-of-range offset).
    #[error(transparent)]
    Validation(#[from] SharedError),

    /// The caller may not perform this operation.
    #[error("Not allowed: {message}")]
    Authorization { message: String },

    /// The referenced entity does not exist (or is soft-deleted).
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// A uniqueness rule was violated; the caller may retry with a
    /// different name.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// An external dependency (hot tier, durable store, token verifier)
    /// did not answer.
    #[error("{component} unavailable: {message}")]
    TransientExternal {
        component: &'static str,
        message: String,
    },

    /// The inbound frame or payload could not be understood.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Durable store operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BackendError {
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn transient(component: &'static str, message: impl Into<String>) -> Self {
        Self::TransientExternal {
            component,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(SharedError::validation(field, message))
    }
}
