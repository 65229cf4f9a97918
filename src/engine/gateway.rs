//! # Remote Persistence Gateway
//!
//! Stateless request/response wrapper around the progress server. The
//! engine talks to storage only through the [`ProgressGateway`] trait, so
//! tests can substitute a scripted implementation.
//!
//! ## Error Split
//!
//! Every operation distinguishes two failure classes:
//!
//! - **Transport**: no usable response (connection refused, timeout, 5xx).
//!   The caller retries and eventually queues offline.
//! - **Rejected**: the server answered and said no (4xx, `success: false`).
//!   Surfaced directly, never retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::shared::api::{
    BatchFailure, BatchSyncRequest, BatchSyncResponse, LoadResponse, SaveMetadata, SaveRequest,
    SaveResponse,
};
use crate::shared::progress::{FileKind, PendingUpdate, ProgressDocument};

/// Updates per batch-sync request
const DEFAULT_CHUNK_SIZE: usize = 100;

/// Gateway failure, split by whether a response was received
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GatewayError {
    /// No usable response from the server
    #[error("Network error: {message}")]
    Transport { message: String },
    /// The server answered and refused the request
    #[error("Request rejected: {message}")]
    Rejected {
        status: Option<u16>,
        message: String,
    },
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// True when retrying could help
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Acknowledgement returned by a successful save
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReceipt {
    /// File the save landed in
    pub filename: Option<String>,
    /// File type the server classified the payload as
    pub file_type: Option<FileKind>,
    /// Server-side timestamp of the save
    pub timestamp: Option<DateTime<Utc>>,
}

/// Document fetched from the server along with its storage details
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: ProgressDocument,
    pub filename: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of replaying queued updates
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub processed: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    /// True when every update was accepted
    pub fn clean(&self) -> bool {
        self.failed == 0
    }
}

/// Remote persistence operations the engine depends on
#[async_trait]
pub trait ProgressGateway: Send + Sync {
    /// Fetch the stored document for this gateway's owner
    ///
    /// `Ok(None)` means the server holds nothing usable for the owner.
    async fn load(&self) -> Result<Option<LoadedDocument>, GatewayError>;

    /// Persist the full current document
    ///
    /// Idempotent: resending the same document is harmless. `update` is the
    /// most recent mutation in the cycle being saved, if any.
    async fn save(
        &self,
        update: Option<&PendingUpdate>,
        document: &ProgressDocument,
    ) -> Result<SaveReceipt, GatewayError>;

    /// Replay queued updates in order
    ///
    /// Partial success is reported per item rather than failing the call.
    async fn batch_sync(&self, updates: &[PendingUpdate]) -> Result<BatchOutcome, GatewayError>;
}

/// [`ProgressGateway`] over HTTP, bound to one `(file kind, owner)` pair
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    file_kind: FileKind,
    owner_id: String,
    chunk_size: usize,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, file_kind: FileKind, owner_id: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            file_kind,
            owner_id: owner_id.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override how many updates ride in one batch-sync request
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/progress/{}", self.base_url, path)
    }

    /// Send one chunk of updates to the batch-sync endpoint
    async fn batch_chunk(&self, updates: &[PendingUpdate]) -> Result<BatchOutcome, GatewayError> {
        let request = BatchSyncRequest {
            updates: updates.to_vec(),
            metadata: SaveMetadata::for_owner(self.file_kind, &self.owner_id),
        };

        let response = self
            .client
            .post(self.api_url("batch-sync"))
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::transport(format!("Network error: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::transport(format!("Server error: {}", status)));
        }

        let body: BatchSyncResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::transport(format!("Failed to parse response: {}", e)))?;

        if !status.is_success() {
            return Err(GatewayError::rejected(
                Some(status.as_u16()),
                body.error
                    .unwrap_or_else(|| format!("Batch sync failed: {}", status)),
            ));
        }

        Ok(BatchOutcome {
            processed: body.processed,
            failed: body.failed,
            failures: body.failures,
        })
    }
}

#[async_trait]
impl ProgressGateway for HttpGateway {
    async fn load(&self) -> Result<Option<LoadedDocument>, GatewayError> {
        let url = self.api_url(&format!(
            "load/{}/{}",
            self.file_kind.load_segment(),
            self.owner_id
        ));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::transport(format!("Network error: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() {
            return Err(GatewayError::transport(format!("Server error: {}", status)));
        }

        let body: LoadResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::transport(format!("Failed to parse response: {}", e)))?;

        if !status.is_success() || !body.success {
            return Err(GatewayError::rejected(
                Some(status.as_u16()),
                body.error.unwrap_or_else(|| format!("Load failed: {}", status)),
            ));
        }

        // A stored payload without a usable item list is treated as absent
        match serde_json::from_value::<ProgressDocument>(body.data) {
            Ok(document) => Ok(Some(LoadedDocument {
                document,
                filename: body.filename,
                last_modified: body.last_modified,
            })),
            Err(e) => {
                tracing::warn!("[Engine] Stored document for '{}' is not usable: {}", self.owner_id, e);
                Ok(None)
            }
        }
    }

    async fn save(
        &self,
        update: Option<&PendingUpdate>,
        document: &ProgressDocument,
    ) -> Result<SaveReceipt, GatewayError> {
        let request = SaveRequest::new(document, self.file_kind, &self.owner_id, update);

        let response = self
            .client
            .post(self.api_url("save"))
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::transport(format!("Network error: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::transport(format!("Server error: {}", status)));
        }

        let body: SaveResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::transport(format!("Failed to parse response: {}", e)))?;

        if !status.is_success() || !body.success {
            return Err(GatewayError::rejected(
                Some(status.as_u16()),
                body.error.unwrap_or_else(|| format!("Save failed: {}", status)),
            ));
        }

        tracing::debug!(
            "[Engine] Saved document for '{}' to {:?}",
            self.owner_id,
            body.filename
        );

        Ok(SaveReceipt {
            filename: body.filename,
            file_type: body.file_type,
            timestamp: body.timestamp,
        })
    }

    async fn batch_sync(&self, updates: &[PendingUpdate]) -> Result<BatchOutcome, GatewayError> {
        if updates.is_empty() {
            return Ok(BatchOutcome::default());
        }

        // A single chunk propagates its failure; a chunked run keeps going
        // and reports per-chunk failures so one bad chunk cannot hide the
        // progress of the rest.
        if updates.len() <= self.chunk_size {
            return self.batch_chunk(updates).await;
        }

        let mut outcome = BatchOutcome::default();
        for chunk in updates.chunks(self.chunk_size) {
            match self.batch_chunk(chunk).await {
                Ok(part) => {
                    outcome.processed += part.processed;
                    outcome.failed += part.failed;
                    outcome.failures.extend(part.failures);
                }
                Err(e) => {
                    tracing::warn!("[Engine] Batch chunk of {} updates failed: {}", chunk.len(), e);
                    outcome.failed += chunk.len();
                    outcome.failures.extend(chunk.iter().map(|update| BatchFailure {
                        item_id: update.item_id.clone(),
                        error: e.to_string(),
                    }));
                }
            }
        }
        Ok(outcome)
    }
}
