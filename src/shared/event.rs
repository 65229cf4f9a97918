/**
 * File Change Event System
 *
 * This module defines the event frames delivered over the change
 * notification channel. The server publishes a frame whenever a stored
 * progress file is created, modified, re-stamped, or deleted; subscribers
 * also receive an initial `connected` frame and periodic `heartbeat` frames
 * that keep long-lived connections alive.
 *
 * Frames are serialized as single-line JSON objects; the `/events` endpoint
 * delivers them newline-delimited.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of frame this is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A stored file changed on disk
    FileChange,
    /// Keep-alive frame on a quiet channel
    Heartbeat,
    /// First frame after a subscription is established
    Connected,
}

/// What happened to the file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileEventType {
    /// Contents were written
    Change,
    /// The file appeared or was renamed
    Rename,
    /// Sync metadata was re-stamped
    Sync,
    /// The file was deleted
    Delete,
}

/// Which part of the system observed the change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    /// A save handler wrote the file
    ProgressServer,
    /// The polling fallback noticed a newer modification time
    Polling,
    /// A single-file sync was requested over HTTP
    ManualTrigger,
    /// A sync of every file was requested over HTTP
    ManualTriggerAll,
    /// A targeted clear deleted the file
    ClearOperation,
    /// A clear-all deleted the file
    ClearAllOperation,
}

/// One frame on the change notification channel
///
/// `filename`, `event_type`, and `source` are present on `file-change`
/// frames only; `message` is present on the initial `connected` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeEvent {
    /// Frame kind
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Affected file, relative to the storage directory
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
    /// What happened to the file
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub event_type: Option<FileEventType>,
    /// Who observed the change
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<EventSource>,
    /// Greeting text on `connected` frames
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    /// When the frame was produced
    pub timestamp: DateTime<Utc>,
}

impl FileChangeEvent {
    /// Create a `file-change` frame
    pub fn file_change(
        filename: impl Into<String>,
        event_type: FileEventType,
        source: EventSource,
    ) -> Self {
        Self {
            kind: EventKind::FileChange,
            filename: Some(filename.into()),
            event_type: Some(event_type),
            source: Some(source),
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a keep-alive frame
    pub fn heartbeat() -> Self {
        Self {
            kind: EventKind::Heartbeat,
            filename: None,
            event_type: None,
            source: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Create the initial subscription frame
    pub fn connected() -> Self {
        Self {
            kind: EventKind::Connected,
            filename: None,
            event_type: None,
            source: None,
            message: Some("File synchronization connected".to_string()),
            timestamp: Utc::now(),
        }
    }
}
