//! Backend server
//!
//! The progress server: an Axum HTTP service that persists progress
//! documents as JSON files, streams file-change events to subscribers,
//! and keeps sync stamps on everything it touches.
//!
//! # Architecture
//!
//! - **`server`** - Configuration, shared state, startup wiring
//! - **`routes`** - Router assembly for the `/api/progress` surface
//! - **`progress`** - File store, save strategies, retention, handlers
//! - **`realtime`** - Event broadcasting, NDJSON subscriptions, polling
//! - **`error`** - `BackendError` and its HTTP conversion
//!
//! State is one cheaply cloneable `AppState`; concurrent access goes
//! through the filesystem and a `tokio::sync::broadcast` channel rather
//! than shared in-memory documents.

/// Server setup and configuration
pub mod server;

/// Route configuration
pub mod routes;

/// Progress storage and handlers
pub mod progress;

/// Real-time update system
pub mod realtime;

/// Backend error types
pub mod error;

pub use error::BackendError;
pub use server::{create_app, AppState, ServerConfig};
