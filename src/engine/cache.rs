//! # Local Document Cache
//!
//! Keeps the last known good document on disk so a session can start from
//! local state before the backend answers, and can keep working when it
//! never does. Each cached file wraps the document in an envelope carrying
//! a checksum; a corrupt or tampered file is discarded rather than loaded.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::checksum;
use crate::shared::progress::ProgressDocument;

/// Envelope written around the cached document
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEnvelope {
    data: ProgressDocument,
    checksum: String,
    timestamp: DateTime<Utc>,
}

/// On-disk cache holding a single document
#[derive(Debug, Clone)]
pub struct DocumentCache {
    path: PathBuf,
}

impl DocumentCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the document, replacing any previous cache file
    pub async fn store(&self, document: &ProgressDocument) -> Result<(), std::io::Error> {
        let envelope = CacheEnvelope {
            checksum: checksum::checksum(document)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
            data: document.clone(),
            timestamp: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, bytes).await?;
        tracing::debug!("[Engine] Cached document at {}", self.path.display());
        Ok(())
    }

    /// Read the cached document, if one exists and passes its checksum.
    ///
    /// Every failure mode degrades to `None`: a session without a cache
    /// behaves like a first run.
    pub async fn load(&self) -> Option<ProgressDocument> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("[Engine] Failed to read cache file: {}", e);
                return None;
            }
        };

        let envelope: CacheEnvelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("[Engine] Cache file is not valid JSON, ignoring: {}", e);
                return None;
            }
        };

        match checksum::verify(&envelope.data, &envelope.checksum) {
            Ok(true) => Some(envelope.data),
            Ok(false) => {
                tracing::warn!("[Engine] Cache checksum mismatch, ignoring cached document");
                None
            }
            Err(e) => {
                tracing::warn!("[Engine] Failed to verify cache checksum: {}", e);
                None
            }
        }
    }

    /// Remove the cache file if present
    pub async fn clear(&self) -> Result<(), std::io::Error> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::progress::PendingUpdate;
    use tempfile::TempDir;

    fn sample_document() -> ProgressDocument {
        let mut doc = ProgressDocument::new();
        doc.apply(&PendingUpdate::add_to_path("kata-1", true));
        doc.apply(&PendingUpdate::mark_completed("kata-1", true));
        doc
    }

    #[tokio::test]
    async fn test_store_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = DocumentCache::new(dir.path().join("progress.json"));
        let doc = sample_document();

        cache.store(&doc).await.unwrap();
        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let cache = DocumentCache::new(dir.path().join("absent.json"));
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn test_tampered_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        let cache = DocumentCache::new(&path);
        cache.store(&sample_document()).await.unwrap();

        // Flip the completion flag without refreshing the checksum
        let text = std::fs::read_to_string(&path).unwrap();
        let tampered = text.replace("\"completed\": true", "\"completed\": false");
        assert_ne!(text, tampered);
        std::fs::write(&path, tampered).unwrap();

        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn test_garbage_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, b"not json at all").unwrap();

        let cache = DocumentCache::new(&path);
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = DocumentCache::new(dir.path().join("progress.json"));
        cache.store(&sample_document()).await.unwrap();

        cache.clear().await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.load().await.is_none());
    }
}
