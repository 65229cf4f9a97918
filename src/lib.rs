//! PathSync - Learning Progress Synchronization
//!
//! PathSync keeps learning-path progress consistent across sessions and
//! restarts: a client-side sync engine that debounces, retries, queues
//! offline work, and merges concurrent edits, plus the progress server
//! that persists documents as JSON files and streams file-change events.
//!
//! # Module Structure
//!
//! - **`shared`** - Types used on both sides of the wire
//!   - Progress documents, pending updates, API bodies, event frames
//!   - Error types and the cache checksum
//!
//! - **`engine`** - Client-side persistence pipeline
//!   - Optimistic in-memory mirror with business-rule validation
//!   - Debounced saves, retry with backoff, offline queue and replay
//!   - Conflict resolution and cross-session document fan-out
//!
//! - **`backend`** - The progress server
//!   - Axum HTTP surface under `/api/progress`
//!   - Save strategies, retention, sync stamping, NDJSON event stream
//!
//! # Usage
//!
//! Client side:
//!
//! ```rust,no_run
//! use pathsync::engine::{EngineConfig, ProgressEngine};
//! use pathsync::shared::progress::{FileKind, PendingUpdate};
//!
//! # async fn example() -> Result<(), pathsync::engine::SyncError> {
//! let engine = ProgressEngine::new(EngineConfig::new(
//!     "http://localhost:3004",
//!     FileKind::KataProgress,
//!     "rust/ownership",
//! ));
//! engine.load().await?;
//! engine
//!     .save_progress(PendingUpdate::add_to_path("rust/ownership", true))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Server side: run the `pathsync-server` binary, or assemble the router
//! with [`backend::create_app`].

/// Shared types and data structures
pub mod shared;

/// Client-side sync engine
pub mod engine;

/// Backend server-side code
pub mod backend;
