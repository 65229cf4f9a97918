//! Real-time file-change delivery
//!
//! One broadcast channel fans file events out to every `/api/progress/events`
//! subscriber. Frames come from the save path, the manual sync endpoints,
//! clear operations, and the polling fallback in `poller`.
//!
//! The subscription endpoint streams frames as newline-delimited JSON with a
//! `connected` frame on arrival and heartbeats while the channel is quiet.

/// Event broadcasting over one shared channel
pub mod broadcast;

/// Polling fallback and watcher health
pub mod poller;

/// NDJSON subscription handler
pub mod subscription;

pub use broadcast::{publish_event, FileEventBroadcast};
pub use poller::{spawn_poller, WatcherStatus};
pub use subscription::subscribe_events;
