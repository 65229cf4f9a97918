/**
 * Server Initialization
 *
 * Builds the running application from a resolved configuration: storage
 * directory, event channel, polling fallback, shared state, router.
 *
 * Startup fails only when the storage directory cannot be created;
 * everything after that point is in-memory wiring.
 */

use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast;

use crate::backend::error::BackendError;
use crate::backend::progress::files::FileStore;
use crate::backend::realtime::poller::{spawn_poller, WatcherStatus};
use crate::backend::routes::router::create_router;
use crate::backend::server::config::ServerConfig;
use crate::backend::server::state::AppState;
use crate::shared::event::FileChangeEvent;

/// Create and configure the Axum application
///
/// # Initialization Steps
///
/// 1. **Storage directory**: created if missing; a failure here aborts
///    startup since every endpoint needs the directory
/// 2. **Event channel**: one broadcast channel feeds every subscriber
/// 3. **Polling fallback**: background task detecting external file edits
/// 4. **State assembly**: cheaply cloneable `AppState`
/// 5. **Router**: the full `/api/progress` surface
pub async fn create_app(config: ServerConfig) -> Result<Router, BackendError> {
    tracing::info!("[Server] Initializing progress server");

    // Step 1: Create the storage directory before anything touches it
    let store = FileStore::new(&config.data_dir);
    store.ensure_dir().await?;
    tracing::info!("[Server] Progress data directory: {}", store.dir().display());
    tracing::info!("[Server] Save strategy: {}", config.strategy);

    // Step 2: Create the event broadcast channel
    let (events, _) = broadcast::channel::<FileChangeEvent>(1000);

    // Step 3: Start the polling fallback
    let watcher = WatcherStatus::new();
    spawn_poller(
        store.clone(),
        events.clone(),
        watcher.clone(),
        config.poll_interval,
    );

    // Step 4: Assemble the shared state
    let app_state = AppState {
        config: Arc::new(config),
        store,
        events,
        watcher,
    };

    // Step 5: Create the router with all routes
    Ok(create_router(app_state))
}
