/**
 * Progress API Wire Types
 *
 * This module defines the request and response bodies exchanged between
 * the sync engine and the progress server. The structures are shared
 * between client and server so both sides serialize the same JSON shape.
 *
 * Every response carries a `success` flag; error responses carry an
 * `error` string alongside `success: false`.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::progress::{FileKind, PendingUpdate, ProgressDocument, ProgressItem};

/// Metadata block sent with a save, identifying file type and owner
///
/// The owner field depends on the file type: kata progress carries
/// `kataId`, self-assessments carry `assessmentId`. The server classifies
/// incoming payloads from these fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveMetadata {
    /// Document schema version
    pub version: u32,
    /// When the document last changed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// File type this payload belongs to
    pub file_type: FileKind,
    /// Owner id for kata progress
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub kata_id: Option<String>,
    /// Owner id for self-assessments
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub assessment_id: Option<String>,
    /// Optional user id, used in self-assessment filenames
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
}

impl SaveMetadata {
    /// Build metadata for an owner, filling the field matching `file_type`
    pub fn for_owner(file_type: FileKind, owner_id: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        let (kata_id, assessment_id) = match file_type {
            FileKind::KataProgress => (Some(owner_id), None),
            FileKind::SelfAssessment => (None, Some(owner_id)),
        };
        Self {
            version: 1,
            last_updated: None,
            file_type,
            kata_id,
            assessment_id,
            user_id: None,
        }
    }

    /// The owner identifier, whichever field carries it
    pub fn owner_id(&self) -> Option<&str> {
        match self.file_type {
            FileKind::KataProgress => self.kata_id.as_deref(),
            FileKind::SelfAssessment => self.assessment_id.as_deref(),
        }
    }
}

/// Body of `POST /api/progress/save`
///
/// Carries the full current document (saves are idempotent whole-document
/// writes, never diffs) plus the mutation that triggered the save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    /// All progress items in the document
    pub items: Vec<ProgressItem>,
    /// Classification and versioning metadata
    pub metadata: SaveMetadata,
    /// The mutation that triggered this save, when there was a single one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub update: Option<PendingUpdate>,
    /// When the request was assembled
    pub timestamp: DateTime<Utc>,
}

impl SaveRequest {
    pub fn new(
        document: &ProgressDocument,
        file_type: FileKind,
        owner_id: &str,
        update: Option<&PendingUpdate>,
    ) -> Self {
        let mut metadata = SaveMetadata::for_owner(file_type, owner_id);
        metadata.version = document.metadata.version;
        metadata.last_updated = document.metadata.last_updated;
        Self {
            items: document.items.clone(),
            metadata,
            update: update.cloned(),
            timestamp: Utc::now(),
        }
    }
}

/// Body of `POST /api/progress/save` responses
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_type: Option<FileKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Body of `GET /api/progress/load/...` responses
///
/// `data` stays an untyped value: the server returns stored files as-is,
/// including stamping fields the document model does not carry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Body of `POST /api/progress/batch-sync`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncRequest {
    /// Queued mutations in their original order
    pub updates: Vec<PendingUpdate>,
    /// Classification metadata for the owning document
    pub metadata: SaveMetadata,
}

/// Per-item failure inside a batch sync
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub item_id: String,
    pub error: String,
}

/// Body of `POST /api/progress/batch-sync` responses
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResponse {
    pub success: bool,
    #[serde(default)]
    pub processed: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub failures: Vec<BatchFailure>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// One stored file in a `GET /api/progress/list` response
///
/// `file_type` is a plain string because the directory can hold files
/// written by other tooling that classify as `unknown`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFileSummary {
    pub filename: String,
    pub file_type: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub size: u64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Body of `GET /api/progress/list` responses
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListResponse {
    pub success: bool,
    #[serde(default)]
    pub files: Vec<StoredFileSummary>,
}

/// Sync stamp written into stored files under `integrationData.syncMetadata`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sync_source: Option<SyncSource>,
}

/// Which server path stamped a file's sync metadata
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SyncSource {
    /// Stamped while handling a save
    ProgressServer,
    /// Stamped by the watcher path (manual sync or poller)
    FileWatcher,
}

/// Per-file entry in a sync-status report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSyncInfo {
    pub filename: String,
    pub file_type: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub sync_metadata: SyncMetadata,
    pub has_sync: bool,
}

/// Aggregate watcher and stamping health for the whole store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub total_files: usize,
    pub synced_files: usize,
    pub unsynced_files: usize,
    pub watcher_active: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_poll_time: Option<DateTime<Utc>>,
    pub files: Vec<FileSyncInfo>,
}

/// Body of `GET /api/progress/sync-status` responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub success: bool,
    pub sync_status: SyncStatus,
}

/// Body of `POST /api/progress/sync`
///
/// Without a filename, every stored file is re-stamped.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
}

/// Body of `POST /api/progress/sync` responses
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub synced_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_files: Option<usize>,
}

/// What a clear request targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClearScope {
    Kata,
    Assessment,
    All,
}

/// Body of `POST /api/progress/clear`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    #[serde(rename = "type")]
    pub scope: ClearScope,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub kata_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub assessment_id: Option<String>,
}

/// Body of `POST /api/progress/clear` responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
    pub deleted_files: Vec<String>,
    pub clear_type: ClearScope,
    pub timestamp: DateTime<Utc>,
}

/// Body of `GET /api/progress/latest` responses
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LatestResponse {
    pub success: bool,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Uniform error body for every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_request_wire_shape() {
        let mut doc = ProgressDocument::new();
        let update = PendingUpdate::add_to_path("rust/ownership", true);
        doc.apply(&update);

        let request = SaveRequest::new(&doc, FileKind::KataProgress, "rust/ownership", Some(&update));
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["metadata"]["fileType"], "kata-progress");
        assert_eq!(json["metadata"]["kataId"], "rust/ownership");
        assert!(json["metadata"].get("assessmentId").is_none());
        assert_eq!(json["update"]["action"], "ADD_TO_PATH");
        assert_eq!(json["items"][0]["addedToPath"], true);
    }

    #[test]
    fn test_assessment_metadata_uses_assessment_id() {
        let metadata = SaveMetadata::for_owner(FileKind::SelfAssessment, "skill-assessment");
        assert_eq!(metadata.owner_id(), Some("skill-assessment"));
        assert!(metadata.kata_id.is_none());

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["assessmentId"], "skill-assessment");
    }

    #[test]
    fn test_clear_request_scope_field_name() {
        let request: ClearRequest =
            serde_json::from_value(serde_json::json!({"type": "kata", "kataId": "rust/intro"}))
                .unwrap();
        assert_eq!(request.scope, ClearScope::Kata);
        assert_eq!(request.kata_id.as_deref(), Some("rust/intro"));
    }

    #[test]
    fn test_save_response_tolerates_error_shape() {
        let response: SaveResponse = serde_json::from_str(
            r#"{"success": false, "error": "Validation failed: missing owner"}"#,
        )
        .unwrap();
        assert!(!response.success);
        assert!(response.filename.is_none());
        assert_eq!(
            response.error.as_deref(),
            Some("Validation failed: missing owner")
        );
    }

    #[test]
    fn test_sync_status_wire_shape() {
        let status = SyncStatusResponse {
            success: true,
            sync_status: SyncStatus {
                total_files: 2,
                synced_files: 1,
                unsynced_files: 1,
                watcher_active: true,
                last_poll_time: None,
                files: vec![],
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["syncStatus"]["totalFiles"], 2);
        assert_eq!(json["syncStatus"]["watcherActive"], true);
    }
}
