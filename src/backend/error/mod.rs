//! Backend Error Module
//!
//! This module defines error types specific to the progress server.
//! These errors are used in HTTP handlers and can be converted to HTTP
//! responses.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - Error type definitions
//! └── conversion.rs - Error conversion implementations
//! ```
//!
//! # HTTP Response Conversion
//!
//! All backend errors implement `IntoResponse` from Axum, allowing them to
//! be returned directly from handlers. The error is converted to the shared
//! `{ success: false, error }` JSON body with the matching status code:
//! validation failures answer 400, storage failures answer 500 (and are
//! logged), handler errors carry their own status.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

// Re-export commonly used types
pub use types::BackendError;
