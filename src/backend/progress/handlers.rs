/**
 * Progress HTTP Handlers
 *
 * Request handlers for the progress API: saving documents through the
 * strategy engine, owner-keyed and filename loads, directory listing,
 * sync status and manual re-stamping, scoped clears, and batch replay of
 * queued updates.
 *
 * Save and batch-sync share one persistence path: classify, resolve the
 * target file, stamp the payload, write, apply retention, publish a
 * `file-change` frame. Handlers answer typed bodies; failures convert to
 * JSON error bodies through `BackendError`.
 */

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::backend::error::BackendError;
use crate::backend::progress::files::{
    classify, sanitize_assessment_id, sanitize_kata_id, stamp_last_updated, stamp_sync_metadata,
    Classification,
};
use crate::backend::progress::retention;
use crate::backend::progress::strategy::{self, SaveTarget};
use crate::backend::realtime::broadcast::publish_event;
use crate::backend::server::state::AppState;
use crate::shared::api::{
    BatchFailure, BatchSyncRequest, BatchSyncResponse, ClearRequest, ClearResponse, ClearScope,
    FileSyncInfo, LatestResponse, ListResponse, LoadResponse, SaveRequest, SaveResponse,
    StoredFileSummary, SyncMetadata, SyncRequest, SyncResponse, SyncSource, SyncStatus,
    SyncStatusResponse,
};
use crate::shared::event::{EventSource, FileChangeEvent, FileEventType};
use crate::shared::progress::{FileKind, ProgressDocument, UpdateAction};

/// Handle `POST /api/progress/save`
///
/// The body is taken as raw JSON so documents keep fields the typed model
/// does not track. A payload whose metadata matches no known file type is
/// rejected rather than stored under a fallback name.
pub async fn save_progress(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<SaveResponse>, BackendError> {
    let Some(class) = classify(&payload) else {
        return Err(BackendError::validation(
            "cannot determine file type from payload metadata",
        ));
    };

    let mut payload = payload;
    let response = persist_document(&state, &class, &mut payload).await?;
    Ok(Json(response))
}

/// Write one document through the strategy engine
///
/// Resolves the target file for the owner, stamps `metadata.lastUpdated`
/// and the sync metadata, writes the payload, applies the retention limit,
/// and publishes a `file-change` frame. Shared by save and batch sync.
async fn persist_document(
    state: &AppState,
    class: &Classification,
    payload: &mut Value,
) -> Result<SaveResponse, BackendError> {
    let now = Utc::now();
    let target = strategy::resolve_target(
        &state.store,
        state.config.strategy,
        state.config.snapshot_interval,
        class,
        now,
    )
    .await?;

    match &target {
        SaveTarget::Update(name) => {
            tracing::info!("[Server] Updating existing {} file: {}", class.kind, name);
        }
        SaveTarget::Create(name) => {
            tracing::info!("[Server] Creating new {} file: {}", class.kind, name);
        }
    }

    stamp_last_updated(payload, now);
    stamp_sync_metadata(payload, SyncSource::ProgressServer, now);

    let filename = target.into_filename();
    state.store.write_value(&filename, payload).await?;

    retention::sweep(&state.store, class, state.config.max_files_per_owner).await;

    publish_event(
        &state.events,
        FileChangeEvent::file_change(&filename, FileEventType::Change, EventSource::ProgressServer),
    );

    Ok(SaveResponse {
        success: true,
        message: Some(format!("{} progress saved successfully", class.kind)),
        filename: Some(filename),
        timestamp: Some(now),
        file_type: Some(class.kind),
        error: None,
    })
}

/// Answer an owner-keyed load with the owner's most recent file
async fn load_latest_for(
    state: &AppState,
    class: &Classification,
    missing: &str,
) -> Result<Json<LoadResponse>, BackendError> {
    let files = state.store.list_for_owner(class).await?;
    let Some(latest) = files.into_iter().next() else {
        return Err(BackendError::not_found(missing));
    };

    let data = state
        .store
        .read_value(&latest.name)
        .await?
        .ok_or_else(|| BackendError::not_found(missing))?;

    Ok(Json(LoadResponse {
        success: true,
        data,
        filename: Some(latest.name),
        last_modified: Some(latest.modified),
        error: None,
    }))
}

/// Handle `GET /api/progress/load/kata/{*kata_id}`
///
/// The kata id is a wildcard segment because kata identifiers contain
/// slashes; it is sanitized the same way saving does, so the lookup hits
/// the files the save path produced.
pub async fn load_kata_progress(
    State(state): State<AppState>,
    Path(kata_id): Path<String>,
) -> Result<Json<LoadResponse>, BackendError> {
    let class = Classification {
        kind: FileKind::KataProgress,
        owner: sanitize_kata_id(&kata_id),
        user_id: None,
    };
    load_latest_for(&state, &class, "No progress found for this kata").await
}

/// Handle `GET /api/progress/load/self-assessment/{assessment_id}`
pub async fn load_assessment_progress(
    State(state): State<AppState>,
    Path(assessment_id): Path<String>,
) -> Result<Json<LoadResponse>, BackendError> {
    let class = Classification {
        kind: FileKind::SelfAssessment,
        owner: sanitize_assessment_id(&assessment_id),
        user_id: None,
    };
    load_latest_for(&state, &class, "No self-assessment progress found").await
}

/// Handle `GET /api/progress/load/{filename}`
pub async fn load_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<LoadResponse>, BackendError> {
    let data = state
        .store
        .read_value(&filename)
        .await?
        .ok_or_else(|| BackendError::not_found("File not found"))?;

    let modified = tokio::fs::metadata(state.store.path_of(&filename))
        .await
        .ok()
        .and_then(|meta| meta.modified().ok())
        .map(DateTime::<Utc>::from);

    Ok(Json(LoadResponse {
        success: true,
        data,
        filename: Some(filename),
        last_modified: modified,
        error: None,
    }))
}

/// Handle `GET /api/progress/latest`
pub async fn load_latest(
    State(state): State<AppState>,
) -> Result<Json<LatestResponse>, BackendError> {
    let mut files = state.store.list().await?;
    files.sort_by(|a, b| b.modified.cmp(&a.modified));

    let Some(latest) = files.into_iter().next() else {
        return Err(BackendError::not_found("No progress files found"));
    };

    let data = state
        .store
        .read_value(&latest.name)
        .await?
        .ok_or_else(|| BackendError::not_found("No progress files found"))?;

    Ok(Json(LatestResponse {
        success: true,
        filename: latest.name,
        data,
    }))
}

/// Handle `GET /api/progress/list`
///
/// Files that vanish or fail to parse between listing and reading are
/// skipped; a directory listing never fails over one bad file.
pub async fn list_files(State(state): State<AppState>) -> Result<Json<ListResponse>, BackendError> {
    let mut files = state.store.list().await?;
    files.sort_by(|a, b| b.modified.cmp(&a.modified));

    let mut summaries = Vec::with_capacity(files.len());
    for file in files {
        let payload = match state.store.read_value(&file.name).await {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("[Server] Skipping unreadable file {}: {}", file.name, e);
                continue;
            }
        };

        let file_type = classify(&payload)
            .map(|class| class.kind.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let metadata = payload
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));

        summaries.push(StoredFileSummary {
            filename: file.name,
            file_type,
            created: file.created,
            modified: file.modified,
            size: file.size,
            metadata,
        });
    }

    Ok(Json(ListResponse {
        success: true,
        files: summaries,
    }))
}

/// Handle `GET /api/progress/sync-status`
pub async fn sync_status(
    State(state): State<AppState>,
) -> Result<Json<SyncStatusResponse>, BackendError> {
    let mut files = state.store.list().await?;
    files.sort_by(|a, b| b.modified.cmp(&a.modified));

    let mut infos = Vec::with_capacity(files.len());
    for file in files {
        let payload = match state.store.read_value(&file.name).await {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("[Server] Skipping unreadable file {}: {}", file.name, e);
                continue;
            }
        };

        let file_type = classify(&payload)
            .map(|class| class.kind.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let sync_metadata: SyncMetadata = payload
            .pointer("/integrationData/syncMetadata")
            .cloned()
            .map(|raw| serde_json::from_value(raw).unwrap_or_default())
            .unwrap_or_default();
        let has_sync = sync_metadata.last_sync.is_some();

        infos.push(FileSyncInfo {
            filename: file.name,
            file_type,
            last_modified: file.modified,
            sync_metadata,
            has_sync,
        });
    }

    let synced_files = infos.iter().filter(|info| info.has_sync).count();
    let sync_status = SyncStatus {
        total_files: infos.len(),
        synced_files,
        unsynced_files: infos.len() - synced_files,
        watcher_active: state.watcher.is_active(),
        last_poll_time: state.watcher.last_poll_time(),
        files: infos,
    };

    Ok(Json(SyncStatusResponse {
        success: true,
        sync_status,
    }))
}

/// Handle `POST /api/progress/sync`
///
/// Re-stamps one named file, or every stored file when the body names
/// none. Stamped files get the watcher source, the same stamp the polling
/// fallback writes.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<SyncResponse>, BackendError> {
    let request: SyncRequest = serde_json::from_value(body)
        .map_err(|e| BackendError::validation(format!("invalid sync request: {}", e)))?;

    if let Some(filename) = request.filename {
        if !state.store.restamp_as_watcher(&filename).await? {
            return Err(BackendError::not_found("File not found"));
        }
        publish_event(
            &state.events,
            FileChangeEvent::file_change(&filename, FileEventType::Sync, EventSource::ManualTrigger),
        );
        tracing::info!("[Server] Manually synchronized file: {}", filename);

        return Ok(Json(SyncResponse {
            success: true,
            message: format!("File {} synchronized successfully", filename),
            synced_count: None,
            total_files: None,
        }));
    }

    let files = state.store.list().await?;
    let total_files = files.len();
    let mut synced_count = 0usize;
    for file in files {
        match state.store.restamp_as_watcher(&file.name).await {
            Ok(true) => {
                publish_event(
                    &state.events,
                    FileChangeEvent::file_change(
                        &file.name,
                        FileEventType::Sync,
                        EventSource::ManualTriggerAll,
                    ),
                );
                synced_count += 1;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!("[Server] Error synchronizing file {}: {}", file.name, e);
            }
        }
    }
    tracing::info!(
        "[Server] Manually synchronized {} of {} file(s)",
        synced_count,
        total_files
    );

    Ok(Json(SyncResponse {
        success: true,
        message: format!("{} files synchronized successfully", synced_count),
        synced_count: Some(synced_count),
        total_files: Some(total_files),
    }))
}

const INVALID_CLEAR_REQUEST: &str =
    "Invalid clear request. Must specify type (kata, assessment, or all) and appropriate identifiers";

/// Handle `POST /api/progress/clear`
///
/// Kata and assessment scopes require their identifier and delete only
/// that owner's files; `all` empties the store. Every deleted file gets a
/// `delete` frame so subscribers can drop cached state.
pub async fn clear_progress(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ClearResponse>, BackendError> {
    let request: ClearRequest = serde_json::from_value(body).map_err(|_| {
        BackendError::handler(axum::http::StatusCode::BAD_REQUEST, INVALID_CLEAR_REQUEST)
    })?;

    let (prefix, source) = match (request.scope, &request.kata_id, &request.assessment_id) {
        (ClearScope::Kata, Some(kata_id), _) => (
            Some(format!("kata-progress-{}-", sanitize_kata_id(kata_id))),
            EventSource::ClearOperation,
        ),
        (ClearScope::Assessment, _, Some(assessment_id)) => (
            Some(format!(
                "self-assessment-{}-",
                sanitize_assessment_id(assessment_id)
            )),
            EventSource::ClearOperation,
        ),
        (ClearScope::All, _, _) => (None, EventSource::ClearAllOperation),
        _ => {
            return Err(BackendError::handler(
                axum::http::StatusCode::BAD_REQUEST,
                INVALID_CLEAR_REQUEST,
            ));
        }
    };

    let files = state.store.list().await?;
    let mut deleted_files = Vec::new();
    for file in files {
        if let Some(prefix) = &prefix {
            if !file.name.starts_with(prefix.as_str()) {
                continue;
            }
        }
        match state.store.remove(&file.name).await {
            Ok(()) => {
                publish_event(
                    &state.events,
                    FileChangeEvent::file_change(&file.name, FileEventType::Delete, source),
                );
                deleted_files.push(file.name);
            }
            Err(e) => {
                tracing::error!("[Server] Error deleting file {}: {}", file.name, e);
            }
        }
    }

    tracing::info!(
        "[Server] Cleared {} progress file(s) ({:?} scope)",
        deleted_files.len(),
        request.scope
    );

    Ok(Json(ClearResponse {
        success: true,
        message: format!("Cleared {} progress files", deleted_files.len()),
        deleted_files,
        clear_type: request.scope,
        timestamp: Utc::now(),
    }))
}

/// Handle `POST /api/progress/batch-sync`
///
/// Replays queued updates in order against the owner's latest stored
/// document (or a fresh one). Updates that violate a business rule are
/// reported per item without stopping the batch; the replayed document is
/// persisted once through the same path a save takes. The response is
/// `success: true` only when every update applied.
pub async fn batch_sync(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<BatchSyncResponse>, BackendError> {
    let request: BatchSyncRequest = serde_json::from_value(body)
        .map_err(|e| BackendError::validation(format!("invalid batch sync request: {}", e)))?;

    let Some(class) = Classification::from_save_metadata(&request.metadata) else {
        return Err(BackendError::validation(
            "batch sync metadata does not identify an owner",
        ));
    };

    if request.updates.is_empty() {
        return Ok(Json(BatchSyncResponse {
            success: true,
            ..Default::default()
        }));
    }

    let mut document = match state.store.list_for_owner(&class).await?.into_iter().next() {
        Some(latest) => state
            .store
            .read_value(&latest.name)
            .await?
            .and_then(|raw| serde_json::from_value::<ProgressDocument>(raw).ok())
            .unwrap_or_default(),
        None => ProgressDocument::default(),
    };

    let mut processed = 0usize;
    let mut failures: Vec<BatchFailure> = Vec::new();
    for update in &request.updates {
        // Completion is only legal for items currently on the path. The
        // check runs against the replayed state, so an earlier update in
        // the same batch can make a later one legal.
        if update.action == UpdateAction::MarkCompleted {
            let on_path = document
                .item(&update.item_id)
                .map(|item| item.added_to_path)
                .unwrap_or(false);
            if !on_path {
                failures.push(BatchFailure {
                    item_id: update.item_id.clone(),
                    error: format!(
                        "cannot mark '{}' completed: item is not on the learning path",
                        update.item_id
                    ),
                });
                continue;
            }
        }
        document.apply(update);
        processed += 1;
    }

    if processed > 0 {
        let mut metadata = request.metadata.clone();
        metadata.version = document.metadata.version;
        metadata.last_updated = document.metadata.last_updated;
        let mut payload = serde_json::to_value(SaveRequest {
            items: document.items,
            metadata,
            update: None,
            timestamp: Utc::now(),
        })?;
        persist_document(&state, &class, &mut payload).await?;
    }

    let failed = failures.len();
    tracing::info!(
        "[Server] Batch sync applied {} update(s) for {}, {} failed",
        processed,
        class.owner,
        failed
    );

    Ok(Json(BatchSyncResponse {
        success: failures.is_empty(),
        processed,
        failed,
        failures,
        error: None,
    }))
}
