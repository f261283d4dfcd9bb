//! # Per-subscriber delivery lanes.
//!
//! [`SubscriberSet`] gives every subscriber its own bounded lane (an mpsc queue
//! plus a worker task), so a slow progress reporter never holds up the
//! `LogWriter` and neither of them can hold up a slot worker.
//!
//! ```text
//! listener ── emit(event) ──┬──► lane "log"      ──► LogWriter::on_event
//!                           ├──► lane "progress" ──► Progress::on_event
//!                           └──► lane ...              │
//!                                                      └─ panic ─► SubscriberPanicked
//! ```
//!
//! - A full or closed lane drops the event for that subscriber only and reports
//!   `SubscriberOverflow` on the bus. Overflow reports are never re-reported.
//! - Events arrive in publish order within one lane; lanes are not ordered
//!   against each other.
//! - A panicking `on_event` is caught; the lane keeps going with the next event.
//!
//! **Warning**: panics are caught through `AssertUnwindSafe`, so a subscriber that
//! panics while holding its own lock leaves that lock poisoned.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, future::join_all};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// One subscriber's queue and the task draining it.
struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    worker: JoinHandle<()>,
}

impl Lane {
    fn open(sub: Arc<dyn Subscribe>, bus: Bus) -> Self {
        let name = sub.name();
        let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
        let worker = tokio::spawn(deliver(sub, rx, bus));
        Self { name, tx, worker }
    }

    /// Queues without waiting; returns the drop reason when the lane cannot take it.
    fn offer(&self, event: &Arc<Event>) -> Option<&'static str> {
        match self.tx.try_send(Arc::clone(event)) {
            Ok(()) => None,
            Err(TrySendError::Full(_)) => Some("full"),
            Err(TrySendError::Closed(_)) => Some("closed"),
        }
    }
}

async fn deliver(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await;
        if let Err(payload) = handled {
            bus.publish(Event::subscriber_panicked(
                sub.name(),
                panic_message(&*payload),
            ));
        }
    }
}

/// Fans dispatcher events out to a fixed group of subscribers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    bus: Bus,
}

impl SubscriberSet {
    /// Opens one lane per subscriber (queue capacity is at least 1).
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let lanes = subs
            .into_iter()
            .map(|sub| Lane::open(sub, bus.clone()))
            .collect();
        Self { lanes, bus }
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Emits a copy of `event` to every lane.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a shared event to every lane without copying it.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let report = event.kind != EventKind::SubscriberOverflow;
        for lane in &self.lanes {
            match lane.offer(&event) {
                Some(reason) if report => {
                    self.bus
                        .publish(Event::subscriber_overflow(lane.name, reason));
                }
                _ => {}
            }
        }
    }

    /// Closes every lane and waits until each has delivered what it already queued.
    pub async fn shutdown(self) {
        let workers: Vec<JoinHandle<()>> = self
            .lanes
            .into_iter()
            .map(|Lane { worker, .. }| worker)
            .collect();
        join_all(workers).await;
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.seen.lock().unwrap().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Exploder;

    #[async_trait]
    impl Subscribe for Exploder {
        async fn on_event(&self, event: &Event) {
            if event.kind == EventKind::ItemFailed {
                panic!("exploder saw a failure");
            }
        }

        fn name(&self) -> &'static str {
            "exploder"
        }
    }

    struct Narrow;

    #[async_trait]
    impl Subscribe for Narrow {
        async fn on_event(&self, _event: &Event) {}

        fn name(&self) -> &'static str {
            "narrow"
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn full_lane_drops_and_reports_once_per_event() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Narrow)], bus);

        // Nothing yields between emits, so the lane's worker has not drained yet.
        set.emit(&Event::new(EventKind::ItemStarting));
        set.emit(&Event::new(EventKind::ItemCompleted));
        set.emit(&Event::subscriber_overflow("other", "full"));
        set.shutdown().await;

        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberOverflow);
        assert_eq!(ev.reason.as_deref(), Some("subscriber=narrow reason=full"));
        assert!(rx.try_recv().is_err(), "overflow reports are not re-reported");
    }

    #[tokio::test]
    async fn delivers_in_order_to_each_subscriber() {
        let bus = Bus::new(16);
        let rec = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let set = SubscriberSet::new(vec![rec.clone()], bus);

        set.emit(&Event::new(EventKind::ItemEnqueued));
        set.emit(&Event::new(EventKind::ItemStarting));
        set.emit(&Event::new(EventKind::Drained));
        set.shutdown().await;

        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec![
                EventKind::ItemEnqueued,
                EventKind::ItemStarting,
                EventKind::Drained
            ]
        );
    }

    #[tokio::test]
    async fn panicking_subscriber_is_isolated() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let rec = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let set = SubscriberSet::new(vec![Arc::new(Exploder), rec.clone()], bus);

        set.emit(&Event::new(EventKind::ItemFailed));
        set.emit(&Event::new(EventKind::Drained));
        set.shutdown().await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.item.as_deref(), Some("exploder"));
        assert_eq!(ev.reason.as_deref(), Some("exploder saw a failure"));
        assert_eq!(rec.seen.lock().unwrap().len(), 2);
    }
}
