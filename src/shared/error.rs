//! Shared Error Types
//!
//! Failure cases that occur on both sides of the wire: payload validation
//! and JSON serialization. Backend-only failures (storage, authorization,
//! protocol) live in `backend::error`.
use thiserror::Error;

/// Errors shared by the wire layer and the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    Validation { field: String, message: String },
}

impl SharedError {
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
