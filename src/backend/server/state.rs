/**
 * Shared Application State
 *
 * One `AppState` is built at startup and cloned into every handler. All
 * fields are cheap to clone: the store is a path handle, the event channel
 * is a broadcast sender, and the rest sit behind `Arc`.
 *
 * The `FromRef` implementations allow handlers to extract one part of the
 * state without naming the whole container, following Axum's recommended
 * substate pattern.
 */

use std::sync::Arc;

use axum::extract::FromRef;

use crate::backend::progress::files::FileStore;
use crate::backend::realtime::broadcast::FileEventBroadcast;
use crate::backend::realtime::poller::WatcherStatus;
use crate::backend::server::config::ServerConfig;

/// State shared across the HTTP surface
#[derive(Debug, Clone)]
pub struct AppState {
    /// Resolved server configuration
    pub config: Arc<ServerConfig>,
    /// The directory of stored progress files
    pub store: FileStore,
    /// Channel feeding `/api/progress/events` subscribers
    pub events: FileEventBroadcast,
    /// Poller health, reported by `/api/progress/sync-status`
    pub watcher: Arc<WatcherStatus>,
}

/// Extract the configuration without the rest of the state
impl FromRef<AppState> for Arc<ServerConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.config.clone()
    }
}

/// Extract the file store without the rest of the state
impl FromRef<AppState> for FileStore {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}

/// Extract the event channel without the rest of the state
impl FromRef<AppState> for FileEventBroadcast {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.events.clone()
    }
}

/// Extract the watcher status without the rest of the state
impl FromRef<AppState> for Arc<WatcherStatus> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.watcher.clone()
    }
}
