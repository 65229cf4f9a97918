/**
 * Router Configuration
 *
 * Assembles the progress API under `/api/progress` and attaches the
 * shared application state.
 *
 * # Route Order
 *
 * The three load routes coexist because the router prefers static
 * segments: `load/kata/...` and `load/self-assessment/...` match before
 * the single-segment `load/{filename}` fallback. The kata id is a
 * wildcard segment because kata identifiers contain slashes.
 */

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::backend::error::BackendError;
use crate::backend::progress::handlers::{
    batch_sync, clear_progress, list_files, load_assessment_progress, load_file,
    load_kata_progress, load_latest, save_progress, sync_status, trigger_sync,
};
use crate::backend::realtime::subscription::subscribe_events;
use crate::backend::server::state::AppState;

/// Create the Axum router with all routes configured
///
/// # Routes
///
/// - `POST /api/progress/save` - Persist a progress document
/// - `POST /api/progress/batch-sync` - Replay queued updates
/// - `GET /api/progress/load/kata/{*kata_id}` - Latest file for a kata
/// - `GET /api/progress/load/self-assessment/{assessment_id}` - Latest self-assessment
/// - `GET /api/progress/load/{filename}` - One stored file by name
/// - `GET /api/progress/latest` - Most recently modified file
/// - `GET /api/progress/list` - Directory listing with stats
/// - `GET /api/progress/sync-status` - Stamping and watcher health
/// - `POST /api/progress/sync` - Re-stamp one file or all of them
/// - `POST /api/progress/clear` - Scoped or full deletion
/// - `GET /api/progress/events` - NDJSON file-change stream
///
/// Unknown routes answer the same JSON error body every failed request
/// uses.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/progress/save", post(save_progress))
        .route("/api/progress/batch-sync", post(batch_sync))
        .route("/api/progress/load/kata/{*kata_id}", get(load_kata_progress))
        .route(
            "/api/progress/load/self-assessment/{assessment_id}",
            get(load_assessment_progress),
        )
        .route("/api/progress/load/{filename}", get(load_file))
        .route("/api/progress/latest", get(load_latest))
        .route("/api/progress/list", get(list_files))
        .route("/api/progress/sync-status", get(sync_status))
        .route("/api/progress/sync", post(trigger_sync))
        .route("/api/progress/clear", post(clear_progress))
        .route("/api/progress/events", get(subscribe_events))
        .fallback(handle_not_found)
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

async fn handle_not_found() -> BackendError {
    BackendError::not_found("Not found")
}
