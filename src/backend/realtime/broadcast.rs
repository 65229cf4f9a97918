/**
 * File Change Broadcasting
 *
 * This module provides the broadcast channel that fans file change
 * notifications out to every connected events subscriber.
 *
 * # Broadcasting
 *
 * Events are broadcast using `tokio::sync::broadcast`, which provides a
 * multi-producer, multi-consumer channel. Every subscriber receives a copy
 * of each frame; a channel with no subscribers silently drops frames.
 *
 * # Producers
 *
 * - The save handler, after a file is written
 * - The sync handlers, after re-stamping sync metadata
 * - The clear handlers, after deleting files
 * - The polling fallback, when it notices an out-of-band modification
 */

use tokio::sync::broadcast;

use crate::shared::event::FileChangeEvent;

/// Broadcast channel for file change notification frames
///
/// Cloned into app state and every producer; subscribers are the
/// long-lived `/events` connections.
pub type FileEventBroadcast = broadcast::Sender<FileChangeEvent>;

/// Broadcast a file change frame to all subscribers
///
/// Returns the number of subscribers that received the frame. A channel
/// with no subscribers is not an error.
pub fn publish_event(events: &FileEventBroadcast, event: FileChangeEvent) -> usize {
    match events.send(event) {
        Ok(subscriber_count) => {
            tracing::debug!(
                "[Realtime] Event broadcast to {} subscriber(s)",
                subscriber_count
            );
            subscriber_count
        }
        Err(_) => {
            tracing::trace!("[Realtime] No subscribers to receive event");
            0
        }
    }
}
