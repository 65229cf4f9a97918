/**
 * Progress Data Model
 *
 * This module defines the core progress types shared between the client-side
 * sync engine and the backend server: individual learning items, the progress
 * document that is stored and transferred as a unit, and the pending update
 * that represents one local mutation awaiting synchronization.
 *
 * All types serialize with camelCase field names so the JSON wire shape is
 * stable across the HTTP surface and the on-disk files.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracks a single learning item's state on the user's path
///
/// # Fields
/// * `id` - Unique item identifier (unique within a document)
/// * `added_to_path` - Whether the item is currently on the learning path
/// * `completed` - Whether the item has been completed
/// * `date_added` - When the item was last added to the path
/// * `date_completed` - When the item was last marked completed
///
/// Toggling `added_to_path` off does not clear `date_completed`; completion
/// history is only cleared by an explicit `MarkCompleted(false)` update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressItem {
    /// Unique item identifier
    pub id: String,
    /// Whether the item is on the learning path
    pub added_to_path: bool,
    /// Whether the item is completed
    pub completed: bool,
    /// Timestamp of the last add-to-path action
    #[serde(default)]
    pub date_added: Option<DateTime<Utc>>,
    /// Timestamp of the last completion
    #[serde(default)]
    pub date_completed: Option<DateTime<Utc>>,
}

impl ProgressItem {
    /// Create a new item with no recorded activity
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            added_to_path: false,
            completed: false,
            date_added: None,
            date_completed: None,
        }
    }

    /// The most recent recorded activity on this item
    ///
    /// Used by conflict resolution: the item instance with the newer
    /// activity timestamp wins the merge.
    pub fn activity_timestamp(&self) -> Option<DateTime<Utc>> {
        match (self.date_added, self.date_completed) {
            (Some(a), Some(c)) => Some(a.max(c)),
            (Some(a), None) => Some(a),
            (None, Some(c)) => Some(c),
            (None, None) => None,
        }
    }
}

/// Document-level bookkeeping carried alongside the items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Schema version of the document
    pub version: u32,
    /// Timestamp of the most recently applied update
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            version: 1,
            last_updated: None,
        }
    }
}

/// The unit of storage, transfer, and conflict resolution
///
/// A document holds every tracked item plus metadata. It is created empty on
/// first load and mutated in place by each accepted [`PendingUpdate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressDocument {
    /// Tracked items; ids are unique
    pub items: Vec<ProgressItem>,
    /// Document bookkeeping
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl ProgressDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an item by id
    pub fn item(&self, id: &str) -> Option<&ProgressItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Apply a mutation to the document
    ///
    /// Synchronous and infallible: the matching item is created if absent,
    /// the relevant fields are set, and `metadata.last_updated` is refreshed
    /// from the update's timestamp. Callers needing business-rule validation
    /// perform it before calling this.
    pub fn apply(&mut self, update: &PendingUpdate) {
        let idx = match self.items.iter().position(|item| item.id == update.item_id) {
            Some(idx) => idx,
            None => {
                self.items.push(ProgressItem::new(update.item_id.clone()));
                self.items.len() - 1
            }
        };
        let item = &mut self.items[idx];

        match update.action {
            UpdateAction::AddToPath => {
                item.added_to_path = update.value;
                item.date_added = update.value.then_some(update.timestamp);
            }
            UpdateAction::MarkCompleted => {
                item.completed = update.value;
                item.date_completed = update.value.then_some(update.timestamp);
            }
        }

        self.metadata.last_updated = Some(update.timestamp);
    }

    /// True when the document tracks no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Classification of a stored progress file
///
/// Determines the filename prefix and which payload field names the owner
/// (`kataId` for kata progress, `assessmentId` for self assessments).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    /// Per-kata progress document
    KataProgress,
    /// Self-assessment document
    SelfAssessment,
}

impl FileKind {
    /// Filename prefix and wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::KataProgress => "kata-progress",
            FileKind::SelfAssessment => "self-assessment",
        }
    }

    /// Payload field that carries the owner identifier for this kind
    pub fn owner_field(&self) -> &'static str {
        match self {
            FileKind::KataProgress => "kataId",
            FileKind::SelfAssessment => "assessmentId",
        }
    }

    /// Path segment used by owner-keyed load routes
    pub fn load_segment(&self) -> &'static str {
        match self {
            FileKind::KataProgress => "kata",
            FileKind::SelfAssessment => "self-assessment",
        }
    }
}

impl std::str::FromStr for FileKind {
    type Err = crate::shared::error::SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kata-progress" => Ok(FileKind::KataProgress),
            "self-assessment" => Ok(FileKind::SelfAssessment),
            other => Err(crate::shared::error::SharedError::validation(
                "fileType",
                format!("unknown file type '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of mutation a [`PendingUpdate`] carries
///
/// Closed set; every consumer matches exhaustively.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UpdateAction {
    /// Toggle an item's membership on the learning path
    #[serde(rename = "ADD_TO_PATH")]
    AddToPath,
    /// Toggle an item's completion state
    #[serde(rename = "MARK_COMPLETED")]
    MarkCompleted,
}

impl UpdateAction {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateAction::AddToPath => "ADD_TO_PATH",
            UpdateAction::MarkCompleted => "MARK_COMPLETED",
        }
    }
}

/// One local mutation awaiting synchronization
///
/// Immutable once created; the unit held by the offline queue and replayed
/// during batch synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    /// What the mutation does
    pub action: UpdateAction,
    /// The item the mutation targets
    pub item_id: String,
    /// The new flag value
    pub value: bool,
    /// When the mutation was issued
    pub timestamp: DateTime<Utc>,
}

impl PendingUpdate {
    /// Create an update stamped with the current time
    pub fn new(action: UpdateAction, item_id: impl Into<String>, value: bool) -> Self {
        Self {
            action,
            item_id: item_id.into(),
            value,
            timestamp: Utc::now(),
        }
    }

    /// Create an add-to-path update
    pub fn add_to_path(item_id: impl Into<String>, value: bool) -> Self {
        Self::new(UpdateAction::AddToPath, item_id, value)
    }

    /// Create a mark-completed update
    pub fn mark_completed(item_id: impl Into<String>, value: bool) -> Self {
        Self::new(UpdateAction::MarkCompleted, item_id, value)
    }

    /// Replace the timestamp (deterministic fixtures)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
