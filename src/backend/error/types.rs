/**
 * Backend Error Types
 *
 * This module defines the error types used by the progress server's HTTP
 * handlers. Every error carries enough information to produce a JSON error
 * body with the right status code.
 *
 * # Error Categories
 *
 * - `Validation` - the payload cannot be classified or is malformed (400)
 * - `Storage` - a disk operation failed (500, logged)
 * - `Handler` - everything with an explicit status, mostly 404s
 * - `Shared` / `Serialization` - wrapped errors from the shared module
 *   and serde_json
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::shared::SharedError;

/// Errors produced by the progress server
#[derive(Error, Debug)]
pub enum BackendError {
    /// Handler error with an explicit status code
    #[error("{message}")]
    Handler {
        /// HTTP status code to return
        status: StatusCode,
        /// Error message
        message: String,
    },

    /// The request payload failed validation
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the payload
        message: String,
    },

    /// A storage operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Underlying I/O failure
        message: String,
    },

    /// Error from the shared module
    #[error(transparent)]
    Shared(#[from] SharedError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    /// Create a handler error with a specific status code
    pub fn handler(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Handler {
            status,
            message: message.into(),
        }
    }

    /// Create a validation error (answered with 400)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a storage error (answered with 500)
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a 404 error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Handler {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Handler { status, .. } => *status,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Shared(SharedError::ValidationError { .. }) => StatusCode::BAD_REQUEST,
            Self::Shared(SharedError::SerializationError { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error message for the response body
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<std::io::Error> for BackendError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_maps_to_400() {
        let error = BackendError::validation("cannot determine file type");
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error.message(),
            "Validation failed: cannot determine file type"
        );
    }

    #[test]
    fn test_storage_error_maps_to_500() {
        let error = BackendError::storage("disk full");
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.message(), "Storage error: disk full");
    }

    #[test]
    fn test_not_found_constructor() {
        let error = BackendError::not_found("No progress found for this kata");
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(error.message(), "No progress found for this kata");
    }

    #[test]
    fn test_handler_error_keeps_explicit_status() {
        let error = BackendError::handler(StatusCode::CONFLICT, "already exists");
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_io_error_becomes_storage() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: BackendError = io_error.into();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.message().contains("denied"));
    }

    #[test]
    fn test_shared_validation_maps_to_400() {
        let error: BackendError = SharedError::validation("kataId", "missing").into();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }
}
