//! # Events emitted by the dispatcher.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Queue events**: admission into the pending queue (enqueued, rejected)
//! - **Item events**: execution flow of a single work item (starting, completed, failed, panicked)
//! - **Dispatcher events**: drain cycle transitions and fatal bookkeeping failures
//!
//! The [`Event`] struct carries additional metadata such as timestamps, item name,
//! launch id, reason, and queue/running counts observed at publish time.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use taskdrain::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ItemFailed)
//!     .with_item("Enemy")
//!     .with_launch(3)
//!     .with_reason("exit status: 1");
//!
//! assert_eq!(ev.kind, EventKind::ItemFailed);
//! assert_eq!(ev.item.as_deref(), Some("Enemy"));
//! assert_eq!(ev.launch, Some(3));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of dispatcher events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `item`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `item`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Queue events ===
    /// Work item accepted into the pending queue.
    ///
    /// Sets:
    /// - `item`: work name
    /// - `pending`: queue length after the push
    ItemEnqueued,

    /// Work item rejected because the pending queue was full.
    ///
    /// Sets:
    /// - `item`: work name
    /// - `pending`: queue length (unchanged)
    ItemRejected,

    // === Item lifecycle events ===
    /// Work item dequeued and about to run.
    ///
    /// Sets:
    /// - `item`: work name
    /// - `launch`: launch id
    /// - `pending`, `running`: counts right after admission
    ItemStarting,

    /// Work item returned `Ok(())`.
    ///
    /// Sets:
    /// - `item`: work name
    /// - `launch`: launch id
    ItemCompleted,

    /// Work item returned an error.
    ///
    /// Sets:
    /// - `item`: work name
    /// - `launch`: launch id
    /// - `reason`: error message
    ItemFailed,

    /// Work item panicked; the panic was contained by its slot worker.
    ///
    /// Sets:
    /// - `item`: work name
    /// - `launch`: launch id
    /// - `reason`: panic info/message
    ItemPanicked,

    // === Dispatcher events ===
    /// Pending queue and running set are both empty; the drain signal fired.
    Drained,

    /// Bookkeeping invariant violated; the current drain cycle was failed.
    ///
    /// Sets:
    /// - `launch`: offending launch id (when known)
    /// - `reason`: error label
    DispatchFailed,
}

/// Dispatcher event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the work item (or subscriber), if applicable.
    pub item: Option<Arc<str>>,
    /// Launch id of the item, if it was admitted.
    pub launch: Option<u64>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Pending queue length observed when the event was built.
    pub pending: Option<usize>,
    /// Running set size observed when the event was built.
    pub running: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            item: None,
            launch: None,
            reason: None,
            pending: None,
            running: None,
        }
    }

    /// Attaches a work item name.
    #[inline]
    pub fn with_item(mut self, item: impl Into<Arc<str>>) -> Self {
        self.item = Some(item.into());
        self
    }

    /// Attaches a launch id.
    #[inline]
    pub fn with_launch(mut self, id: u64) -> Self {
        self.launch = Some(id);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches pending/running counts.
    #[inline]
    pub fn with_counts(mut self, pending: usize, running: usize) -> Self {
        self.pending = Some(pending);
        self.running = Some(running);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_item(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_item(subscriber)
            .with_reason(info)
    }
}
