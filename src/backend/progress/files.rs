/**
 * Progress File Store
 *
 * This module owns the directory of stored progress files: listing with
 * stats, reads and writes of arbitrary JSON payloads, classification of
 * payloads into file types, owner extraction, and the deterministic
 * filename scheme.
 *
 * # Filename Scheme
 *
 * `{file-type}-{owner}-{timestamp}.json`, where the owner identifier is
 * sanitized (kata ids replace `/` with `_`, assessment ids keep only
 * `[A-Za-z0-9-_]`) and the RFC 3339 timestamp has `:` and `.` replaced by
 * `-`. Self-assessment filenames carry a user id segment between owner and
 * timestamp. Lookups by owner are a prefix match on `{file-type}-{owner}-`.
 *
 * # Sync Stamping
 *
 * Stored payloads carry a stamp under `integrationData.syncMetadata`
 * recording when and by which path they were last written. The save path
 * also refreshes `metadata.lastUpdated` when the payload has a metadata
 * block.
 */

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::backend::error::BackendError;
use crate::shared::api::{SaveMetadata, SyncSource};
use crate::shared::progress::FileKind;

/// How a payload classified, and under which owner it files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Which file family the payload belongs to
    pub kind: FileKind,
    /// Sanitized owner identifier
    pub owner: String,
    /// User id segment for self-assessment filenames
    pub user_id: Option<String>,
}

impl Classification {
    /// The filename prefix shared by every file this owner has
    pub fn owner_prefix(&self) -> String {
        format!("{}-{}-", self.kind.as_str(), self.owner)
    }

    /// Classification from already-typed save metadata
    ///
    /// Used by batch sync, where the wire body carries a `SaveMetadata`
    /// block instead of a raw payload. `None` when the owner field for the
    /// declared file type is missing.
    pub fn from_save_metadata(metadata: &SaveMetadata) -> Option<Self> {
        let raw_owner = metadata.owner_id()?;
        let owner = match metadata.file_type {
            FileKind::KataProgress => sanitize_kata_id(raw_owner),
            FileKind::SelfAssessment => sanitize_assessment_id(raw_owner),
        };
        Some(Self {
            kind: metadata.file_type,
            owner,
            user_id: metadata.user_id.clone(),
        })
    }
}

/// Classify a payload from its metadata
///
/// Classification probes, in order: `metadata.fileType`, `metadata.type`,
/// and the presence of a kata id (`metadata.kataId` or top-level `kataId`).
/// A payload matching none of them cannot be stored.
pub fn classify(payload: &Value) -> Option<Classification> {
    let metadata = payload.get("metadata");

    let kind = metadata
        .and_then(|m| m.get("fileType"))
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<FileKind>().ok())
        .or_else(|| {
            match metadata.and_then(|m| m.get("type")).and_then(Value::as_str) {
                Some("self-assessment") => Some(FileKind::SelfAssessment),
                _ => None,
            }
        })
        .or_else(|| raw_kata_id(payload).map(|_| FileKind::KataProgress))?;

    let owner = match kind {
        FileKind::KataProgress => {
            sanitize_kata_id(raw_kata_id(payload).unwrap_or("unknown-kata"))
        }
        FileKind::SelfAssessment => sanitize_assessment_id(
            metadata
                .and_then(|m| m.get("assessmentId"))
                .and_then(Value::as_str)
                .unwrap_or("skill-assessment"),
        ),
    };

    let user_id = metadata
        .and_then(|m| m.get("userId"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    Some(Classification {
        kind,
        owner,
        user_id,
    })
}

fn raw_kata_id(payload: &Value) -> Option<&str> {
    payload
        .get("metadata")
        .and_then(|m| m.get("kataId"))
        .and_then(Value::as_str)
        .or_else(|| payload.get("kataId").and_then(Value::as_str))
}

/// Kata ids may contain path-like slashes; flatten them for filenames
pub fn sanitize_kata_id(raw: &str) -> String {
    raw.replace('/', "_")
}

/// Assessment ids keep only filename-safe characters
pub fn sanitize_assessment_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Render a timestamp as a filename segment
///
/// RFC 3339 with millisecond precision, `:` and `.` replaced by `-` so the
/// segment is safe on every filesystem.
pub fn timestamp_slug(timestamp: DateTime<Utc>) -> String {
    timestamp
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// Derive the filename a new file for this owner would get
pub fn filename_for(class: &Classification, timestamp: DateTime<Utc>) -> String {
    let slug = timestamp_slug(timestamp);
    match class.kind {
        FileKind::KataProgress => format!("kata-progress-{}-{}.json", class.owner, slug),
        FileKind::SelfAssessment => {
            let user = class.user_id.as_deref().unwrap_or("user");
            format!("self-assessment-{}-{}-{}.json", class.owner, user, slug)
        }
    }
}

/// Refresh `metadata.lastUpdated`, when the payload carries a metadata block
pub fn stamp_last_updated(payload: &mut Value, now: DateTime<Utc>) {
    if let Some(metadata) = payload.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.insert("lastUpdated".to_string(), serde_json::json!(now));
    }
}

/// Write the sync stamp under `integrationData.syncMetadata`
///
/// Missing intermediate objects are created; anything else already stored
/// under `integrationData` is preserved.
pub fn stamp_sync_metadata(payload: &mut Value, source: SyncSource, now: DateTime<Utc>) {
    let Some(root) = payload.as_object_mut() else {
        return;
    };

    let integration = root
        .entry("integrationData")
        .or_insert_with(|| Value::Object(Default::default()));
    let Some(integration) = integration.as_object_mut() else {
        return;
    };

    let sync = integration
        .entry("syncMetadata")
        .or_insert_with(|| Value::Object(Default::default()));
    if let Some(sync) = sync.as_object_mut() {
        sync.insert("lastSync".to_string(), serde_json::json!(now));
        sync.insert("syncSource".to_string(), serde_json::json!(source));
    }
}

/// Filenames must stay inside the storage directory
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

/// One stored file with its filesystem stats
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Filename relative to the storage directory
    pub name: String,
    /// Absolute path
    pub path: PathBuf,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// Creation time, falling back to `modified` where unsupported
    pub created: DateTime<Utc>,
    /// Size in bytes
    pub size: u64,
}

/// Async access to the directory of stored progress files
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The storage directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the storage directory if it does not exist yet
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Absolute path of a stored file
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Whether a stored file exists
    pub async fn exists(&self, filename: &str) -> bool {
        is_safe_filename(filename) && tokio::fs::try_exists(self.path_of(filename)).await.unwrap_or(false)
    }

    /// List every stored `.json` file with its stats, unordered
    ///
    /// Entries that cannot be stat'ed are skipped with a warning rather
    /// than failing the whole listing.
    pub async fn list(&self) -> Result<Vec<StoredFile>, BackendError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") {
                continue;
            }

            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!("[Server] Could not stat {}: {}", name, e);
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }

            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let created = meta.created().map(DateTime::<Utc>::from).unwrap_or(modified);

            files.push(StoredFile {
                name,
                path: entry.path(),
                modified,
                created,
                size: meta.len(),
            });
        }

        Ok(files)
    }

    /// List an owner's files, most recently modified first
    pub async fn list_for_owner(
        &self,
        class: &Classification,
    ) -> Result<Vec<StoredFile>, BackendError> {
        let prefix = class.owner_prefix();
        let mut files: Vec<StoredFile> = self
            .list()
            .await?
            .into_iter()
            .filter(|file| file.name.starts_with(&prefix))
            .collect();
        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(files)
    }

    /// Read a stored file as JSON; `None` when it does not exist
    pub async fn read_value(&self, filename: &str) -> Result<Option<Value>, BackendError> {
        if !is_safe_filename(filename) {
            return Ok(None);
        }
        match tokio::fs::read(self.path_of(filename)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a JSON payload to a stored file
    pub async fn write_value(&self, filename: &str, payload: &Value) -> Result<(), BackendError> {
        if !is_safe_filename(filename) {
            return Err(BackendError::validation(format!(
                "unsafe filename '{}'",
                filename
            )));
        }
        let bytes = serde_json::to_vec_pretty(payload)?;
        tokio::fs::write(self.path_of(filename), bytes).await?;
        Ok(())
    }

    /// Re-stamp a stored file's sync metadata with the watcher source
    ///
    /// Shared by the polling fallback and the manual sync endpoints.
    /// Returns `false` when no such file exists.
    pub async fn restamp_as_watcher(&self, filename: &str) -> Result<bool, BackendError> {
        let Some(mut payload) = self.read_value(filename).await? else {
            return Ok(false);
        };
        stamp_sync_metadata(&mut payload, SyncSource::FileWatcher, Utc::now());
        self.write_value(filename, &payload).await?;
        Ok(true)
    }

    /// Delete a stored file
    pub async fn remove(&self, filename: &str) -> Result<(), BackendError> {
        tokio::fs::remove_file(self.path_of(filename)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kata_payload(kata_id: &str) -> Value {
        json!({
            "items": [],
            "metadata": { "fileType": "kata-progress", "kataId": kata_id }
        })
    }

    #[test]
    fn test_classify_by_file_type_field() {
        let class = classify(&kata_payload("rust/ownership")).unwrap();
        assert_eq!(class.kind, FileKind::KataProgress);
        assert_eq!(class.owner, "rust_ownership");
    }

    #[test]
    fn test_classify_by_type_field() {
        let payload = json!({
            "metadata": { "type": "self-assessment", "assessmentId": "skill-assessment" }
        });
        let class = classify(&payload).unwrap();
        assert_eq!(class.kind, FileKind::SelfAssessment);
        assert_eq!(class.owner, "skill-assessment");
    }

    #[test]
    fn test_classify_by_top_level_kata_id() {
        let class = classify(&json!({ "kataId": "basics", "items": [] })).unwrap();
        assert_eq!(class.kind, FileKind::KataProgress);
        assert_eq!(class.owner, "basics");
    }

    #[test]
    fn test_unclassifiable_payload() {
        assert!(classify(&json!({ "items": [] })).is_none());
        assert!(classify(&json!("just a string")).is_none());
    }

    #[test]
    fn test_assessment_id_sanitization() {
        assert_eq!(
            sanitize_assessment_id("skill assessment!/2024"),
            "skill_assessment__2024"
        );
    }

    #[test]
    fn test_filename_shape() {
        let class = classify(&kata_payload("rust/intro")).unwrap();
        let timestamp = "2026-08-22T10:15:30.123Z".parse().unwrap();
        let filename = filename_for(&class, timestamp);

        assert_eq!(
            filename,
            "kata-progress-rust_intro-2026-08-22T10-15-30-123Z.json"
        );
        assert!(filename.starts_with(&class.owner_prefix()));
    }

    #[test]
    fn test_assessment_filename_carries_user() {
        let payload = json!({
            "metadata": {
                "fileType": "self-assessment",
                "assessmentId": "skill-assessment",
                "userId": "dev-1"
            }
        });
        let class = classify(&payload).unwrap();
        let timestamp = "2026-08-22T10:15:30.123Z".parse().unwrap();
        assert_eq!(
            filename_for(&class, timestamp),
            "self-assessment-skill-assessment-dev-1-2026-08-22T10-15-30-123Z.json"
        );
    }

    #[test]
    fn test_stamps_create_missing_paths() {
        let mut payload = kata_payload("basics");
        let now = Utc::now();

        stamp_last_updated(&mut payload, now);
        stamp_sync_metadata(&mut payload, SyncSource::ProgressServer, now);

        assert!(payload["metadata"]["lastUpdated"].is_string());
        assert_eq!(
            payload["integrationData"]["syncMetadata"]["syncSource"],
            "progress-server"
        );
        assert!(payload["integrationData"]["syncMetadata"]["lastSync"].is_string());
    }

    #[test]
    fn test_stamp_last_updated_without_metadata_block() {
        let mut payload = json!({ "kataId": "basics" });
        stamp_last_updated(&mut payload, Utc::now());
        assert!(payload.get("metadata").is_none());
    }

    #[test]
    fn test_safe_filenames() {
        assert!(is_safe_filename("kata-progress-a-b.json"));
        assert!(!is_safe_filename("../escape.json"));
        assert!(!is_safe_filename("nested/name.json"));
        assert!(!is_safe_filename(""));
    }

    #[tokio::test]
    async fn test_owner_listing_is_prefix_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store
            .write_value("kata-progress-rust-2026-01-01T00-00-00-000Z.json", &json!({}))
            .await
            .unwrap();
        store
            .write_value(
                "kata-progress-rust_intro-2026-01-01T00-00-00-000Z.json",
                &json!({}),
            )
            .await
            .unwrap();
        store.write_value("notes.json", &json!({})).await.unwrap();

        let class = classify(&kata_payload("rust")).unwrap();
        let files = store.list_for_owner(&class).await.unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].name.starts_with("kata-progress-rust-"));
    }

    #[tokio::test]
    async fn test_read_value_round_trip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let payload = kata_payload("basics");
        store.write_value("kata.json", &payload).await.unwrap();

        assert_eq!(store.read_value("kata.json").await.unwrap(), Some(payload));
        assert_eq!(store.read_value("missing.json").await.unwrap(), None);
        assert!(store.exists("kata.json").await);
        assert!(!store.exists("missing.json").await);
    }
}
