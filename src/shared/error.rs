//! Shared Error Types
//!
//! This module defines error types shared between the sync engine and the
//! backend server.
//!
//! # Error Categories
//!
//! - `SerializationError` - JSON serialization/deserialization failures
//! - `ValidationError` - Data validation failures
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be safely shared across thread
//! boundaries.
use thiserror::Error;

/// Error types that can occur on either side of the sync boundary
#[derive(Debug, Error, Clone)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
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
