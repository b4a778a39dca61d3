//! Delayed event scheduler.
//!
//! Runs closures after a delay on the tokio runtime without blocking the
//! caller. Each pending event is tracked with a label and due time so it can
//! be inspected or cancelled. Actions capture ids, not references, and must
//! re-check that whatever they touch still exists when they fire.

use dashmap::DashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

/// Current time on the combat clock.
#[must_use]
pub fn now() -> Instant {
    Instant::now()
}

/// Handle to a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    /// Raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct PendingEvent {
    label: &'static str,
    due: Instant,
    abort: Option<AbortHandle>,
}

/// Label and due time of a pending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInfo {
    /// Event id
    pub id: EventId,
    /// What the event does
    pub label: &'static str,
    /// When it next fires
    pub due: Instant,
}

/// Schedules one-shot and repeating actions on a tokio runtime.
#[derive(Debug, Clone)]
pub struct DelayedEventScheduler {
    handle: Handle,
    pending: Arc<DashMap<EventId, PendingEvent>>,
    next_id: Arc<AtomicU64>,
}

impl DelayedEventScheduler {
    /// Creates a scheduler spawning onto `handle`.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            pending: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Creates a scheduler on the runtime of the calling task, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    fn register(&self, label: &'static str, due: Instant) -> EventId {
        let id = EventId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.insert(
            id,
            PendingEvent {
                label,
                due,
                abort: None,
            },
        );
        id
    }

    fn attach(&self, id: EventId, abort: AbortHandle) {
        if let Some(mut event) = self.pending.get_mut(&id) {
            event.abort = Some(abort);
        }
    }

    /// Runs `action` once after `delay`.
    pub fn schedule<F>(&self, label: &'static str, delay: Duration, action: F) -> EventId
    where
        F: FnOnce() + Send + 'static,
    {
        let due = Instant::now() + delay;
        let id = self.register(label, due);
        let pending = Arc::clone(&self.pending);

        let task = self.handle.spawn(async move {
            tokio::time::sleep_until(due).await;
            if pending.remove(&id).is_some() {
                debug!("Firing {label} (event {})", id.0);
                action();
            }
        });
        self.attach(id, task.abort_handle());
        id
    }

    /// Runs `action` every `interval` until it returns `Break`.
    pub fn schedule_repeating<F>(&self, label: &'static str, interval: Duration, mut action: F) -> EventId
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let first = Instant::now() + interval;
        let id = self.register(label, first);
        let pending = Arc::clone(&self.pending);

        let task = self.handle.spawn(async move {
            let mut due = first;
            loop {
                tokio::time::sleep_until(due).await;
                if !pending.contains_key(&id) {
                    return;
                }
                if action().is_break() {
                    pending.remove(&id);
                    debug!("Stopped {label} (event {})", id.0);
                    return;
                }
                due += interval;
                if let Some(mut event) = pending.get_mut(&id) {
                    event.due = due;
                }
            }
        });
        self.attach(id, task.abort_handle());
        id
    }

    /// Cancels a pending event. Returns whether it had not fired yet.
    ///
    /// An action already running is not interrupted.
    pub fn cancel(&self, id: EventId) -> bool {
        match self.pending.remove(&id) {
            Some((_, event)) => {
                if let Some(abort) = event.abort {
                    abort.abort();
                }
                true
            },
            None => false,
        }
    }

    /// Number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Snapshot of pending events, earliest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingInfo> {
        let mut events: Vec<PendingInfo> = self
            .pending
            .iter()
            .map(|entry| PendingInfo {
                id: *entry.key(),
                label: entry.label,
                due: entry.due,
            })
            .collect();
        events.sort_by_key(|e| (e.due, e.id));
        events
    }

    /// Pending events with the given label.
    #[must_use]
    pub fn pending_labelled(&self, label: &str) -> Vec<PendingInfo> {
        self.pending()
            .into_iter()
            .filter(|e| e.label == label)
            .collect()
    }
}
