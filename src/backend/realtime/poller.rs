/**
 * Polling Fallback
 *
 * Native file-change notification is unreliable in containers, so the
 * server runs a polling fallback: a background task scans the storage
 * directory on a fixed interval and publishes a `file-change` frame
 * (source `polling`) for every file modified since the previous scan.
 * Detected files are re-stamped with `syncSource: "file-watcher"`, the
 * same stamp a manual sync writes.
 *
 * The new scan baseline is taken after the re-stamp writes complete, so
 * the poller's own writes are never re-detected on the next pass.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::backend::progress::files::FileStore;
use crate::backend::realtime::broadcast::{publish_event, FileEventBroadcast};
use crate::shared::event::{EventSource, FileChangeEvent, FileEventType};

/// Watcher health shared between the poller task and `/sync-status`
#[derive(Debug, Default)]
pub struct WatcherStatus {
    active: AtomicBool,
    last_poll: RwLock<Option<DateTime<Utc>>>,
}

impl WatcherStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether the poller task is running
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// When the directory was last scanned
    pub fn last_poll_time(&self) -> Option<DateTime<Utc>> {
        self.last_poll.read().map(|guard| *guard).unwrap_or(None)
    }

    fn mark_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    fn record_poll(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.last_poll.write() {
            *guard = Some(at);
        }
    }
}

/// Scan for files modified after `last_seen`
///
/// Publishes a `polling` frame and re-stamps sync metadata for each
/// detected file, then returns the next scan baseline. A listing failure
/// keeps the old baseline so nothing is skipped once the directory is
/// readable again.
pub async fn scan_once(
    store: &FileStore,
    events: &FileEventBroadcast,
    last_seen: DateTime<Utc>,
) -> DateTime<Utc> {
    let files = match store.list().await {
        Ok(files) => files,
        Err(e) => {
            tracing::error!("[Realtime] File polling check failed: {}", e);
            return last_seen;
        }
    };

    for file in files.into_iter().filter(|f| f.modified > last_seen) {
        publish_event(
            events,
            FileChangeEvent::file_change(&file.name, FileEventType::Change, EventSource::Polling),
        );
        if let Err(e) = store.restamp_as_watcher(&file.name).await {
            tracing::error!("[Realtime] Error synchronizing file {}: {}", file.name, e);
        }
    }

    // Baseline taken after the re-stamp writes so they are not re-detected.
    Utc::now()
}

/// Spawn the polling fallback task
pub fn spawn_poller(
    store: FileStore,
    events: FileEventBroadcast,
    status: Arc<WatcherStatus>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        status.mark_active(true);
        tracing::info!(
            "[Realtime] Polling fallback scanning every {:?}",
            period
        );

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut last_seen = Utc::now();
        loop {
            ticker.tick().await;
            last_seen = scan_once(&store, &events, last_seen).await;
            status.record_poll(last_seen);
        }
    })
}
