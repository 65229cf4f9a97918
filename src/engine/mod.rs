//! # Progress Sync Engine
//!
//! Client-side persistence pipeline for progress documents. The engine owns
//! the live document, debounces rapid mutations into single saves, retries
//! transient failures with exponential backoff, queues work while offline,
//! and reconciles documents arriving from other sessions.
//!
//! ## Pipeline
//!
//! - **[`store`]**: in-memory mirror the UI reads from; mutations apply
//!   optimistically before any network traffic
//! - **[`scheduler`]**: explicit state machine driving debounce, retry, and
//!   offline transitions
//! - **[`gateway`]**: HTTP boundary to the progress server
//! - **[`queue`]**: FIFO buffer replayed once connectivity returns
//! - **[`conflict`]**: per-item last-write-wins document merge
//! - **[`cache`]**: checksummed local mirror surviving restarts
//! - **[`channel`]**: document fan-out between sessions in one process

pub mod cache;
pub mod channel;
pub mod conflict;
pub mod gateway;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod store;

pub use cache::DocumentCache;
pub use channel::{DocumentChannel, DocumentEndpoint, PeerDocument, PeerReceiver};
pub use conflict::{merge_documents, MergeOutcome};
pub use gateway::{
    BatchOutcome, GatewayError, HttpGateway, LoadedDocument, ProgressGateway, SaveReceipt,
};
pub use queue::{DrainPlan, OfflineQueue, QueueStats};
pub use retry::RetryPolicy;
pub use scheduler::{CycleOutcome, SaveScheduler, SchedulerState};
pub use store::MirrorStore;

use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::shared::progress::{FileKind, PendingUpdate, ProgressDocument};

use scheduler::{DebounceCheck, MutationRoute, OutcomeReceiver, SettleNext};

/// Buffered notifications per subscriber before oldest entries drop
const NOTIFICATION_CAPACITY: usize = 64;

/// Failures surfaced by engine operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// The mutation violates a business rule; nothing was sent
    #[error("Business rule violation: {message}")]
    BusinessRule { message: String },
    /// No usable response from the server
    #[error("Network error: {message}")]
    Transport { message: String },
    /// The server answered and refused the request
    #[error("Save rejected: {message}")]
    Rejected { message: String },
    /// The save did not settle within the wait ceiling
    #[error("Save did not settle within {0:?}")]
    Timeout(Duration),
    /// The pipeline shut down before the save settled
    #[error("Save pipeline closed before settling")]
    PipelineClosed,
}

impl From<GatewayError> for SyncError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Transport { message } => SyncError::Transport { message },
            GatewayError::Rejected { message, .. } => SyncError::Rejected { message },
        }
    }
}

/// Tuning knobs for one engine instance
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the progress server, e.g. `http://localhost:3004`
    pub base_url: String,
    /// Kind of document this engine maintains
    pub file_kind: FileKind,
    /// Owner identifier the documents are stored under
    pub owner_id: String,
    /// Quiet window between a mutation and its save
    pub debounce_window: Duration,
    /// Longest a caller waits for a save to settle
    pub save_wait_ceiling: Duration,
    /// Cadence of the background queue replay
    pub flush_interval: Duration,
    /// Backoff policy for failed save attempts
    pub retry: RetryPolicy,
    /// Local mirror file; `None` disables the mirror
    pub cache_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>, file_kind: FileKind, owner_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            file_kind,
            owner_id: owner_id.into(),
            debounce_window: Duration::from_millis(200),
            save_wait_ceiling: Duration::from_secs(30),
            flush_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            cache_path: None,
        }
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    pub fn with_save_wait_ceiling(mut self, ceiling: Duration) -> Self {
        self.save_wait_ceiling = ceiling;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }
}

/// Severity a notification is displayed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
}

/// User-facing events the engine emits
///
/// Closed set; every variant carries a fixed display message so the engine,
/// not each caller, owns the sync vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    /// A mutation was stored while offline
    SavedOffline,
    /// A debounced save reached the server
    Synchronized,
    /// Retries were exhausted; the work is queued for replay
    SavedLocally,
    /// The offline queue replayed successfully
    QueueFlushed,
    /// A merge kept contributions from both sides
    ConflictResolved,
    /// Another session's document updated this one
    PeerUpdated,
    /// A rejection or refused update surfaced to the user
    Warning { message: String },
}

impl EngineNotification {
    /// Display copy for the notification
    pub fn message(&self) -> &str {
        match self {
            EngineNotification::SavedOffline => "Changes saved offline",
            EngineNotification::Synchronized => "Changes synchronized",
            EngineNotification::SavedLocally => "Saved locally - will sync when online",
            EngineNotification::QueueFlushed => "All changes synced successfully",
            EngineNotification::ConflictResolved => "Sync conflict resolved",
            EngineNotification::PeerUpdated => "Progress updated from another tab",
            EngineNotification::Warning { message } => message,
        }
    }

    pub fn level(&self) -> NotificationLevel {
        match self {
            EngineNotification::SavedOffline | EngineNotification::PeerUpdated => {
                NotificationLevel::Info
            }
            EngineNotification::Synchronized | EngineNotification::QueueFlushed => {
                NotificationLevel::Success
            }
            EngineNotification::SavedLocally
            | EngineNotification::ConflictResolved
            | EngineNotification::Warning { .. } => NotificationLevel::Warning,
        }
    }
}

/// How a settled save ended, from the caller's point of view
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The document reached the server
    Saved { filename: Option<String> },
    /// The mutation is parked in the offline queue
    Queued { pending: usize },
}

/// Point-in-time pipeline status for displays
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    /// Scheduler position
    pub state: SchedulerState,
    /// Updates waiting in the offline queue
    pub queued: usize,
    /// Timestamp of the oldest queued update
    pub oldest_queued: Option<DateTime<Utc>>,
    /// Items tracked by the live document
    pub items: usize,
}

/// The progress persistence engine
///
/// Cheap to clone; clones share the same pipeline. Must be created inside a
/// Tokio runtime since construction spawns the save runner task.
#[derive(Clone)]
pub struct ProgressEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    store: RwLock<MirrorStore>,
    queue: OfflineQueue,
    scheduler: Mutex<SaveScheduler>,
    gateway: Arc<dyn ProgressGateway>,
    cache: Option<DocumentCache>,
    endpoint: OnceLock<DocumentEndpoint>,
    notifications: broadcast::Sender<EngineNotification>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl ProgressEngine {
    /// Create an engine talking to the progress server over HTTP
    pub fn new(config: EngineConfig) -> Self {
        let gateway = Arc::new(HttpGateway::new(
            config.base_url.clone(),
            config.file_kind,
            config.owner_id.clone(),
        ));
        Self::with_gateway(config, gateway)
    }

    /// Create an engine over an explicit gateway implementation
    pub fn with_gateway(config: EngineConfig, gateway: Arc<dyn ProgressGateway>) -> Self {
        let scheduler = SaveScheduler::new(config.debounce_window);
        let wake = scheduler.waker();
        let cache = config.cache_path.clone().map(DocumentCache::new);
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let inner = Arc::new(EngineInner {
            config,
            store: RwLock::new(MirrorStore::new()),
            queue: OfflineQueue::new(),
            scheduler: Mutex::new(scheduler),
            gateway,
            cache,
            endpoint: OnceLock::new(),
            notifications,
            tasks: StdMutex::new(Vec::new()),
        });

        let engine = Self { inner };
        let weak = Arc::downgrade(&engine.inner);
        let handle = tokio::spawn(EngineInner::run_save_loop(weak, wake));
        engine.track(handle);
        engine
    }

    /// Subscribe to user-facing sync notifications
    pub fn subscribe(&self) -> broadcast::Receiver<EngineNotification> {
        self.inner.notifications.subscribe()
    }

    /// Join a document channel shared with other sessions
    ///
    /// Documents published by peers merge into this engine's store; documents
    /// this engine saves are published to peers. Joining twice is a no-op.
    pub fn join_channel(&self, channel: &DocumentChannel) {
        let endpoint = channel.endpoint();
        let receiver = endpoint.subscribe();
        if self.inner.endpoint.set(endpoint).is_err() {
            tracing::warn!("[Engine] Document channel already joined");
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut receiver = receiver;
            while let Some(peer) = receiver.recv().await {
                let Some(engine) = weak.upgrade() else { return };
                engine.absorb_peer_document(peer.document).await;
            }
            tracing::debug!("[Engine] Peer listener ended");
        });
        self.track(handle);
    }

    /// Start the periodic offline-queue replay
    ///
    /// Every `flush_interval` the engine retries the queue if anything is
    /// waiting, which also probes whether connectivity came back.
    pub fn start_background_flush(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.flush_interval;
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else { return };
                if engine.queue.is_empty().await {
                    continue;
                }
                if let Err(error) = engine.drain_queued_updates().await {
                    tracing::debug!("[Engine] Background replay still failing: {}", error);
                }
            }
        });
        self.track(handle);
    }

    /// Apply a mutation and persist it through the debounced pipeline
    ///
    /// The document updates immediately; the network save happens after the
    /// debounce window closes, shared with every other mutation in the same
    /// cycle. Offline, the mutation goes straight to the queue. The returned
    /// future settles when the cycle does, bounded by `save_wait_ceiling`.
    pub async fn save_progress(&self, update: PendingUpdate) -> Result<SaveOutcome, SyncError> {
        self.inner.save_progress(update).await
    }

    /// Load the owner's document, preferring the server over the local mirror
    ///
    /// The mirror (when configured) restores first so the UI has data even
    /// while the server is unreachable. A server document then merges with
    /// whatever is held locally. Transport failures switch the engine
    /// offline and serve the local copy.
    pub async fn load(&self) -> Result<ProgressDocument, SyncError> {
        self.inner.load().await
    }

    /// Collapse the debounce window and wait for the pending save to settle
    pub async fn flush(&self) -> Result<(), SyncError> {
        self.inner.flush().await
    }

    /// Mark connectivity lost; subsequent mutations queue immediately
    pub async fn set_offline(&self) {
        self.inner.go_offline().await;
    }

    /// Mark connectivity restored and replay the offline queue
    ///
    /// Returns how many queued updates were replayed. A failed replay keeps
    /// the queue intact and the engine offline.
    pub async fn set_online(&self) -> Result<usize, SyncError> {
        self.inner.drain_queued_updates().await
    }

    /// Snapshot of the live document
    pub async fn document(&self) -> ProgressDocument {
        self.inner.store.read().await.snapshot()
    }

    /// Current pipeline status
    pub async fn status(&self) -> EngineStatus {
        let stats = self.inner.queue.stats().await;
        let state = self.inner.scheduler.lock().await.state();
        let items = self.inner.store.read().await.document().items.len();
        EngineStatus {
            state,
            queued: stats.queued,
            oldest_queued: stats.oldest,
            items,
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.inner.tasks.lock() {
            Ok(mut tasks) => tasks.push(handle),
            Err(_) => handle.abort(),
        }
    }
}

impl EngineInner {
    /// Drives debounce deadlines and executes save cycles
    ///
    /// Holds only a weak reference so dropping the last engine handle stops
    /// the pipeline.
    async fn run_save_loop(inner: Weak<EngineInner>, wake: Arc<Notify>) {
        loop {
            let deadline = {
                let Some(engine) = inner.upgrade() else { return };
                let scheduler = engine.scheduler.lock().await;
                scheduler.next_deadline()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = wake.notified() => continue,
                    }
                }
                None => {
                    wake.notified().await;
                    continue;
                }
            }

            let Some(engine) = inner.upgrade() else { return };
            let check = { engine.scheduler.lock().await.begin_save() };
            if let DebounceCheck::Fire(updates) = check {
                engine.execute_cycle(updates).await;
            }
        }
    }

    async fn save_progress(&self, update: PendingUpdate) -> Result<SaveOutcome, SyncError> {
        let applied = {
            let mut store = self.store.write().await;
            store
                .validate(&update)
                .map(|_| store.apply_mutation(&update))
        };
        let document = match applied {
            Ok(document) => document,
            Err(error) => {
                self.notify(EngineNotification::Warning {
                    message: "Add to learning path first".to_string(),
                });
                return Err(error);
            }
        };

        self.store_cache(&document).await;
        self.publish_document(document);

        let route = { self.scheduler.lock().await.note_mutation(update.clone()) };
        match route {
            MutationRoute::Scheduled(receiver) => self.await_outcome(receiver).await,
            MutationRoute::QueueOffline => {
                self.queue.enqueue(update).await;
                let pending = self.queue.len().await;
                self.notify(EngineNotification::SavedOffline);
                Ok(SaveOutcome::Queued { pending })
            }
        }
    }

    /// Wait for a cycle's shared outcome, bounded by the wait ceiling
    async fn await_outcome(&self, mut receiver: OutcomeReceiver) -> Result<SaveOutcome, SyncError> {
        let ceiling = self.config.save_wait_ceiling;
        let settled = tokio::time::timeout(ceiling, async {
            loop {
                if let Some(outcome) = receiver.borrow_and_update().clone() {
                    return Some(outcome);
                }
                if receiver.changed().await.is_err() {
                    return receiver.borrow().clone();
                }
            }
        })
        .await;

        match settled {
            Err(_) => Err(SyncError::Timeout(ceiling)),
            Ok(None) => Err(SyncError::PipelineClosed),
            Ok(Some(CycleOutcome::Saved { filename })) => Ok(SaveOutcome::Saved { filename }),
            Ok(Some(CycleOutcome::Rejected { message })) => Err(SyncError::Rejected { message }),
            Ok(Some(CycleOutcome::QueuedOffline)) => Ok(SaveOutcome::Queued {
                pending: self.queue.len().await,
            }),
        }
    }

    /// Run one fired cycle: attempt, retry, settle
    async fn execute_cycle(&self, updates: Vec<PendingUpdate>) {
        let document = self.store.read().await.snapshot();
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1u32;

        let result = loop {
            match self.gateway.save(updates.last(), &document).await {
                Ok(receipt) => break Ok(receipt),
                Err(error) if error.is_transport() && attempt < max_attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    tracing::warn!(
                        "[Engine] Save attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        max_attempts,
                        error,
                        delay
                    );
                    self.scheduler.lock().await.mark_retrying();
                    tokio::time::sleep(delay).await;
                    self.scheduler.lock().await.mark_attempting();
                    attempt += 1;
                }
                Err(error) => break Err(error),
            }
        };

        let next = match result {
            Ok(receipt) => {
                tracing::debug!("[Engine] Save cycle settled after {} attempt(s)", attempt);
                let next = self
                    .scheduler
                    .lock()
                    .await
                    .settle(CycleOutcome::Saved { filename: receipt.filename }, false);
                self.notify(EngineNotification::Synchronized);
                next
            }
            Err(error) if error.is_transport() => {
                tracing::warn!(
                    "[Engine] Save gave up after {} attempt(s), queueing {} update(s): {}",
                    attempt,
                    updates.len(),
                    error
                );
                for update in updates {
                    self.queue.enqueue(update).await;
                }
                let next = self
                    .scheduler
                    .lock()
                    .await
                    .settle(CycleOutcome::QueuedOffline, true);
                self.notify(EngineNotification::SavedLocally);
                next
            }
            Err(error) => {
                let message = error.to_string();
                let next = self
                    .scheduler
                    .lock()
                    .await
                    .settle(CycleOutcome::Rejected { message: message.clone() }, false);
                self.notify(EngineNotification::Warning { message });
                next
            }
        };

        if let SettleNext::QueueLeftovers(leftovers) = next {
            for update in leftovers {
                self.queue.enqueue(update).await;
            }
        }
    }

    async fn load(&self) -> Result<ProgressDocument, SyncError> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.load().await {
                tracing::info!(
                    "[Engine] Restored {} item(s) from the local mirror",
                    cached.items.len()
                );
                self.store.write().await.replace(cached);
            }
        }

        match self.gateway.load().await {
            Ok(Some(loaded)) => {
                let (document, conflicting) = {
                    let mut store = self.store.write().await;
                    if store.document().is_empty() {
                        store.replace(loaded.document);
                        (store.snapshot(), false)
                    } else {
                        let outcome = merge_documents(store.document(), &loaded.document);
                        let conflicting = outcome.conflicting;
                        if outcome.changed {
                            store.replace(outcome.document);
                        }
                        (store.snapshot(), conflicting)
                    }
                };
                self.store_cache(&document).await;
                self.scheduler.lock().await.set_online();
                if conflicting {
                    self.notify(EngineNotification::ConflictResolved);
                }
                Ok(document)
            }
            Ok(None) => Ok(self.store.read().await.snapshot()),
            Err(error) if error.is_transport() => {
                tracing::warn!("[Engine] Load failed, serving the local mirror: {}", error);
                let handed_back = self.scheduler.lock().await.set_offline();
                for update in handed_back {
                    self.queue.enqueue(update).await;
                }
                Ok(self.store.read().await.snapshot())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn flush(&self) -> Result<(), SyncError> {
        let receiver = {
            let mut scheduler = self.scheduler.lock().await;
            scheduler.expedite();
            scheduler.subscribe_current()
        };
        match receiver {
            Some(receiver) => self.await_outcome(receiver).await.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn go_offline(&self) {
        tracing::info!("[Engine] Going offline, changes will queue locally");
        let handed_back = self.scheduler.lock().await.set_offline();
        for update in handed_back {
            self.queue.enqueue(update).await;
        }
    }

    /// Replay the offline queue: one save for a single update, one ordered
    /// batch otherwise
    async fn drain_queued_updates(&self) -> Result<usize, SyncError> {
        match self.queue.drain_plan().await {
            DrainPlan::Empty => {
                self.scheduler.lock().await.set_online();
                Ok(0)
            }
            DrainPlan::Single(update) => {
                let document = self.store.read().await.snapshot();
                match self.gateway.save(Some(&update), &document).await {
                    Ok(_) => {
                        self.finish_drain(1).await;
                        Ok(1)
                    }
                    Err(error) => self.drain_failed(error).await,
                }
            }
            DrainPlan::Batch(updates) => match self.gateway.batch_sync(&updates).await {
                Ok(outcome) if outcome.clean() => {
                    self.finish_drain(updates.len()).await;
                    Ok(updates.len())
                }
                Ok(outcome) => {
                    // The server processed the batch but refused some of it;
                    // replaying the refused updates would not change the
                    // answer, so the queue still clears.
                    self.queue.remove_first(updates.len()).await;
                    self.scheduler.lock().await.set_online();
                    tracing::warn!(
                        "[Engine] Batch replay finished with {} refused update(s)",
                        outcome.failed
                    );
                    self.notify(EngineNotification::Warning {
                        message: format!(
                            "{} queued change(s) were refused by the server",
                            outcome.failed
                        ),
                    });
                    Ok(outcome.processed)
                }
                Err(error) => self.drain_failed(error).await,
            },
        }
    }

    async fn finish_drain(&self, count: usize) {
        self.queue.remove_first(count).await;
        self.scheduler.lock().await.set_online();
        tracing::info!("[Engine] Replayed {} queued update(s)", count);
        self.notify(EngineNotification::QueueFlushed);
    }

    async fn drain_failed(&self, error: GatewayError) -> Result<usize, SyncError> {
        tracing::warn!("[Engine] Queue replay failed, queue kept intact: {}", error);
        let handed_back = self.scheduler.lock().await.set_offline();
        for update in handed_back {
            self.queue.enqueue(update).await;
        }
        Err(error.into())
    }

    /// Merge a document published by another session
    async fn absorb_peer_document(&self, remote: ProgressDocument) {
        let (changed, conflicting, document) = {
            let mut store = self.store.write().await;
            let outcome = merge_documents(store.document(), &remote);
            let changed = outcome.changed;
            let conflicting = outcome.conflicting;
            if changed {
                store.replace(outcome.document);
            }
            (changed, conflicting, store.snapshot())
        };

        if !changed {
            return;
        }
        self.store_cache(&document).await;
        if conflicting {
            self.notify(EngineNotification::ConflictResolved);
        }
        self.notify(EngineNotification::PeerUpdated);
    }

    async fn store_cache(&self, document: &ProgressDocument) {
        if let Some(cache) = &self.cache {
            if let Err(error) = cache.store(document).await {
                tracing::warn!("[Engine] Mirror write failed: {}", error);
            }
        }
    }

    fn publish_document(&self, document: ProgressDocument) {
        if let Some(endpoint) = self.endpoint.get() {
            endpoint.publish(document);
        }
    }

    fn notify(&self, notification: EngineNotification) {
        tracing::debug!("[Engine] Notify: {}", notification.message());
        let _ = self.notifications.send(notification);
    }
}
