//! # Save Scheduler
//!
//! Explicit state machine for the debounced save pipeline. Every mutation
//! is routed through the scheduler, which decides whether it starts a new
//! debounce cycle, coalesces into the current one, rides along after the
//! in-flight save, or bypasses debouncing entirely while offline.
//!
//! ## States
//!
//! - **idle**: nothing scheduled
//! - **pending-debounce**: mutations collected, waiting out the quiet window
//! - **in-flight**: one save attempt is on the wire
//! - **retrying**: between failed attempts, waiting out the backoff delay
//! - **offline**: the server is unreachable; mutations queue immediately
//!
//! ## Cycle Sharing
//!
//! Each debounce cycle owns a single outcome slot. Every mutation routed
//! into the cycle (including ones that arrive while its save is already in
//! flight) receives a receiver for the same slot, so all callers of a cycle
//! settle together. Mutations that arrive during flight additionally ride
//! along into the next cycle, which starts as soon as the current one
//! settles.
//!
//! Methods are synchronous and never block; the engine drives the actual
//! waiting from its runner task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::Instant;

use crate::shared::progress::PendingUpdate;

/// Where the save pipeline currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    PendingDebounce,
    InFlight,
    Retrying,
    Offline,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::PendingDebounce => "pending-debounce",
            SchedulerState::InFlight => "in-flight",
            SchedulerState::Retrying => "retrying",
            SchedulerState::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// How one debounce cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The document reached the server
    Saved { filename: Option<String> },
    /// The server answered and refused the document
    Rejected { message: String },
    /// Retries were exhausted; the cycle's updates moved to the offline queue
    QueuedOffline,
}

/// Receiver side of a cycle's shared outcome slot
pub type OutcomeReceiver = watch::Receiver<Option<CycleOutcome>>;

/// Where [`SaveScheduler::note_mutation`] routed a mutation
pub enum MutationRoute {
    /// The mutation is part of a cycle; await the shared outcome
    Scheduled(OutcomeReceiver),
    /// Offline; the caller queues the mutation directly
    QueueOffline,
}

/// What the runner should do after the debounce sleep elapses
#[derive(Debug, PartialEq)]
pub enum DebounceCheck {
    /// The window is over; save these updates now
    Fire(Vec<PendingUpdate>),
    /// A later mutation pushed the deadline; keep waiting
    Rescheduled,
    /// No cycle is waiting anymore
    NotPending,
}

/// What the runner should do after settling a cycle
#[derive(Debug, PartialEq)]
pub enum SettleNext {
    /// Nothing else to do
    Done,
    /// Ride-along mutations started the next cycle
    StartNext,
    /// The pipeline is offline; queue these ride-along updates
    QueueLeftovers(Vec<PendingUpdate>),
}

/// One debounce cycle's shared outcome and collected updates
struct SaveCycle {
    outcome: watch::Sender<Option<CycleOutcome>>,
    updates: Vec<PendingUpdate>,
}

impl SaveCycle {
    fn new(update: PendingUpdate) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            outcome,
            updates: vec![update],
        }
    }

    fn from_updates(updates: Vec<PendingUpdate>) -> Self {
        let (outcome, _) = watch::channel(None);
        Self { outcome, updates }
    }
}

/// State machine behind the debounced save pipeline
pub struct SaveScheduler {
    state: SchedulerState,
    debounce_window: Duration,
    /// When the pending cycle fires
    deadline: Option<Instant>,
    /// The active cycle, from first mutation until settle
    cycle: Option<SaveCycle>,
    /// Mutations that arrived during flight; they form the next cycle
    next_updates: Vec<PendingUpdate>,
    /// Offline was requested while a save was on the wire
    offline_requested: bool,
    /// Wakes the runner when a new cycle starts or a deadline moves up
    wake: Arc<Notify>,
}

impl SaveScheduler {
    pub fn new(debounce_window: Duration) -> Self {
        Self {
            state: SchedulerState::Idle,
            debounce_window,
            deadline: None,
            cycle: None,
            next_updates: Vec::new(),
            offline_requested: false,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Handle the runner parks on while no deadline is armed
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// When the pending cycle is due, if one is waiting
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True while a cycle is collecting, in flight, or retrying
    pub fn has_pending_work(&self) -> bool {
        matches!(
            self.state,
            SchedulerState::PendingDebounce | SchedulerState::InFlight | SchedulerState::Retrying
        )
    }

    /// Outcome receiver for the active cycle, if any
    pub fn subscribe_current(&self) -> Option<OutcomeReceiver> {
        self.cycle.as_ref().map(|cycle| cycle.outcome.subscribe())
    }

    /// Route a freshly applied mutation through the pipeline
    pub fn note_mutation(&mut self, update: PendingUpdate) -> MutationRoute {
        match self.state {
            SchedulerState::Offline => MutationRoute::QueueOffline,
            SchedulerState::Idle => {
                let cycle = SaveCycle::new(update);
                let receiver = cycle.outcome.subscribe();
                self.cycle = Some(cycle);
                self.deadline = Some(Instant::now() + self.debounce_window);
                self.set_state(SchedulerState::PendingDebounce);
                self.wake.notify_one();
                MutationRoute::Scheduled(receiver)
            }
            SchedulerState::PendingDebounce => {
                // Coalesce: the update joins the cycle and the window restarts
                let receiver = match &mut self.cycle {
                    Some(cycle) => {
                        cycle.updates.push(update);
                        cycle.outcome.subscribe()
                    }
                    None => {
                        let cycle = SaveCycle::new(update);
                        let receiver = cycle.outcome.subscribe();
                        self.cycle = Some(cycle);
                        receiver
                    }
                };
                self.deadline = Some(Instant::now() + self.debounce_window);
                MutationRoute::Scheduled(receiver)
            }
            SchedulerState::InFlight | SchedulerState::Retrying => {
                // Shares the in-flight outcome; the data rides the next cycle
                self.next_updates.push(update);
                match self.subscribe_current() {
                    Some(receiver) => MutationRoute::Scheduled(receiver),
                    None => MutationRoute::QueueOffline,
                }
            }
        }
    }

    /// Called by the runner once the debounce sleep elapses
    pub fn begin_save(&mut self) -> DebounceCheck {
        if self.state != SchedulerState::PendingDebounce {
            return DebounceCheck::NotPending;
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => {
                self.deadline = None;
                self.set_state(SchedulerState::InFlight);
                let updates = self
                    .cycle
                    .as_ref()
                    .map(|cycle| cycle.updates.clone())
                    .unwrap_or_default();
                DebounceCheck::Fire(updates)
            }
            Some(_) => DebounceCheck::Rescheduled,
            None => DebounceCheck::NotPending,
        }
    }

    /// A save attempt failed and the backoff sleep is starting
    pub fn mark_retrying(&mut self) {
        if self.state == SchedulerState::InFlight {
            self.set_state(SchedulerState::Retrying);
        }
    }

    /// The next save attempt is going on the wire
    pub fn mark_attempting(&mut self) {
        if self.state == SchedulerState::Retrying {
            self.set_state(SchedulerState::InFlight);
        }
    }

    /// Resolve the active cycle and decide what runs next
    ///
    /// `went_offline` is set when the cycle exhausted its retries; it moves
    /// the pipeline to offline, handing any ride-along updates back for
    /// queueing. Otherwise ride-alongs seed the next debounce cycle.
    pub fn settle(&mut self, outcome: CycleOutcome, went_offline: bool) -> SettleNext {
        if let Some(cycle) = self.cycle.take() {
            let _ = cycle.outcome.send(Some(outcome));
        }
        self.deadline = None;

        let leftovers = std::mem::take(&mut self.next_updates);

        if went_offline || self.offline_requested {
            self.offline_requested = false;
            self.set_state(SchedulerState::Offline);
            return SettleNext::QueueLeftovers(leftovers);
        }

        if leftovers.is_empty() {
            self.set_state(SchedulerState::Idle);
            SettleNext::Done
        } else {
            self.cycle = Some(SaveCycle::from_updates(leftovers));
            self.deadline = Some(Instant::now() + self.debounce_window);
            self.set_state(SchedulerState::PendingDebounce);
            SettleNext::StartNext
        }
    }

    /// Move to offline immediately
    ///
    /// A cycle still waiting out its debounce window settles as queued;
    /// its updates come back to the caller for offline queueing. A save
    /// already on the wire is left to finish; its settle completes the
    /// transition.
    pub fn set_offline(&mut self) -> Vec<PendingUpdate> {
        match self.state {
            SchedulerState::Offline => Vec::new(),
            SchedulerState::InFlight | SchedulerState::Retrying => {
                self.offline_requested = true;
                Vec::new()
            }
            SchedulerState::Idle | SchedulerState::PendingDebounce => {
                let mut updates = Vec::new();
                if let Some(cycle) = self.cycle.take() {
                    updates.extend(cycle.updates.iter().cloned());
                    let _ = cycle.outcome.send(Some(CycleOutcome::QueuedOffline));
                }
                updates.extend(std::mem::take(&mut self.next_updates));
                self.deadline = None;
                self.set_state(SchedulerState::Offline);
                updates
            }
        }
    }

    /// Leave offline once connectivity is restored
    pub fn set_online(&mut self) {
        self.offline_requested = false;
        if self.state == SchedulerState::Offline {
            self.set_state(SchedulerState::Idle);
        }
    }

    /// Collapse the debounce window so the pending cycle fires now
    pub fn expedite(&mut self) -> bool {
        if self.state == SchedulerState::PendingDebounce {
            self.deadline = Some(Instant::now());
            self.wake.notify_one();
            true
        } else {
            false
        }
    }

    fn set_state(&mut self, next: SchedulerState) {
        if self.state != next {
            tracing::debug!("[Engine] Scheduler {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const WINDOW: Duration = Duration::from_millis(200);

    fn update(id: &str) -> PendingUpdate {
        PendingUpdate::add_to_path(id, true)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_mutation_starts_a_cycle() {
        let mut scheduler = SaveScheduler::new(WINDOW);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let route = scheduler.note_mutation(update("a"));
        assert!(matches!(route, MutationRoute::Scheduled(_)));
        assert_eq!(scheduler.state(), SchedulerState::PendingDebounce);
        assert!(scheduler.next_deadline().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_cycle() {
        let mut scheduler = SaveScheduler::new(WINDOW);
        scheduler.note_mutation(update("a"));
        scheduler.note_mutation(update("b"));
        scheduler.note_mutation(update("c"));

        advance(WINDOW).await;
        match scheduler.begin_save() {
            DebounceCheck::Fire(updates) => {
                assert_eq!(updates.len(), 3);
                assert_eq!(updates[0].item_id, "a");
                assert_eq!(updates[2].item_id, "c");
            }
            other => panic!("expected Fire, got {:?}", other),
        }
        assert_eq!(scheduler.state(), SchedulerState::InFlight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_mutation_resets_the_window() {
        let mut scheduler = SaveScheduler::new(WINDOW);
        scheduler.note_mutation(update("a"));

        advance(WINDOW / 2).await;
        scheduler.note_mutation(update("b"));

        // The original deadline has passed but the reset one has not
        advance(WINDOW / 2).await;
        assert_eq!(scheduler.begin_save(), DebounceCheck::Rescheduled);

        advance(WINDOW / 2).await;
        assert!(matches!(scheduler.begin_save(), DebounceCheck::Fire(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_mutation_shares_outcome_and_rides_next_cycle() {
        let mut scheduler = SaveScheduler::new(WINDOW);
        scheduler.note_mutation(update("a"));
        advance(WINDOW).await;
        assert!(matches!(scheduler.begin_save(), DebounceCheck::Fire(_)));

        // Arrives while the save is on the wire
        let route = scheduler.note_mutation(update("b"));
        let mut receiver = match route {
            MutationRoute::Scheduled(receiver) => receiver,
            MutationRoute::QueueOffline => panic!("expected a scheduled route"),
        };

        let next = scheduler.settle(
            CycleOutcome::Saved {
                filename: Some("kata-progress-a.json".into()),
            },
            false,
        );
        assert_eq!(next, SettleNext::StartNext);
        assert_eq!(scheduler.state(), SchedulerState::PendingDebounce);

        // The ride-along caller already observed the settled outcome
        assert!(matches!(
            receiver.borrow_and_update().clone(),
            Some(CycleOutcome::Saved { .. })
        ));

        // The next cycle fires with only the ride-along update
        advance(WINDOW).await;
        match scheduler.begin_save() {
            DebounceCheck::Fire(updates) => {
                assert_eq!(updates.len(), 1);
                assert_eq!(updates[0].item_id, "b");
            }
            other => panic!("expected Fire, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_bypasses_debouncing() {
        let mut scheduler = SaveScheduler::new(WINDOW);
        scheduler.set_offline();

        let route = scheduler.note_mutation(update("a"));
        assert!(matches!(route, MutationRoute::QueueOffline));
        assert_eq!(scheduler.state(), SchedulerState::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_offline_settles_waiting_cycle() {
        let mut scheduler = SaveScheduler::new(WINDOW);
        let route = scheduler.note_mutation(update("a"));
        scheduler.note_mutation(update("b"));

        let handed_back = scheduler.set_offline();
        assert_eq!(handed_back.len(), 2);
        assert_eq!(scheduler.state(), SchedulerState::Offline);

        if let MutationRoute::Scheduled(mut receiver) = route {
            assert_eq!(
                receiver.borrow_and_update().clone(),
                Some(CycleOutcome::QueuedOffline)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_settle_hands_leftovers_back() {
        let mut scheduler = SaveScheduler::new(WINDOW);
        scheduler.note_mutation(update("a"));
        advance(WINDOW).await;
        assert!(matches!(scheduler.begin_save(), DebounceCheck::Fire(_)));

        scheduler.mark_retrying();
        assert_eq!(scheduler.state(), SchedulerState::Retrying);
        scheduler.note_mutation(update("b"));

        match scheduler.settle(CycleOutcome::QueuedOffline, true) {
            SettleNext::QueueLeftovers(leftovers) => {
                assert_eq!(leftovers.len(), 1);
                assert_eq!(leftovers[0].item_id, "b");
            }
            other => panic!("expected QueueLeftovers, got {:?}", other),
        }
        assert_eq!(scheduler.state(), SchedulerState::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expedite_fires_without_waiting() {
        let mut scheduler = SaveScheduler::new(WINDOW);
        scheduler.note_mutation(update("a"));

        assert!(scheduler.expedite());
        assert!(matches!(scheduler.begin_save(), DebounceCheck::Fire(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_after_offline_returns_to_idle() {
        let mut scheduler = SaveScheduler::new(WINDOW);
        scheduler.set_offline();
        scheduler.set_online();
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let route = scheduler.note_mutation(update("a"));
        assert!(matches!(route, MutationRoute::Scheduled(_)));
    }
}
