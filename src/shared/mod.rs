//! Shared Module
//!
//! This module contains types and data structures that are shared between
//! the client-side sync engine and the backend server. These types define
//! the JSON shapes used for storage, transfer, and change notification.
//!
//! # Overview
//!
//! The shared module provides platform-agnostic types that can be used
//! in both server and engine code. All types are designed for serialization
//! and transmission over HTTP.

/// Progress data model
pub mod progress;

/// Progress API wire types
pub mod api;

/// File change event system
pub mod event;

/// Shared error types
pub mod error;

/// Content checksums for cached documents
pub mod checksum;

/// Re-export commonly used types for convenience
pub use progress::{
    DocumentMetadata, FileKind, PendingUpdate, ProgressDocument, ProgressItem, UpdateAction,
};
pub use api::{ErrorResponse, SaveMetadata, SaveRequest, SaveResponse};
pub use event::{EventKind, EventSource, FileChangeEvent, FileEventType};
pub use error::SharedError;
