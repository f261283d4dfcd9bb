//! # Dispatcher: bounded-parallelism, self-refilling work runner.
//!
//! The [`Dispatcher`] owns a FIFO pending queue, a running set keyed by
//! dispatcher-generated launch ids, and the current [`DrainSignal`]. All three live
//! behind one mutex; the lock is never held across an `.await`.
//!
//! ## Refill loop
//! ```text
//! process() ─► snapshot DrainSignal ─► drive()
//!                                        │ lock
//!                                        ├─ free = max_parallel - |running|
//!                                        ├─ pop ≤ free items, insert each under a fresh LaunchId
//!                                        ├─ pending = ∅ ∧ running = ∅ ? swap DrainSignal
//!                                        │ unlock
//!                                        ├─ resolve old DrainSignal (if swapped)
//!                                        └─ spawn one slot worker per admitted item
//!
//! slot worker:
//!   loop {
//!     ├─► run item (panics contained by catch_unwind)
//!     ├─► publish ItemCompleted / ItemFailed / ItemPanicked
//!     │ lock
//!     ├─► remove own LaunchId (missing → DispatchError::UnknownLaunch)
//!     ├─► admit more (same as drive)
//!     ├─► drained ? swap DrainSignal
//!     │ unlock
//!     ├─► resolve old DrainSignal (if swapped)
//!     └─► keep the first admitted item for itself, spawn workers for the rest;
//!         exit when nothing was admitted
//!   }
//! ```
//!
//! A completion never calls back into `drive()` recursively: the chain of
//! launch → complete → refill is an explicit loop inside each slot worker.
//!
//! ## Rules
//! - `|running| <= max_parallel` at every instant (admission happens under the lock)
//! - admission is FIFO; completion order is unconstrained
//! - a dequeued item is never re-queued
//! - item errors and panics are published as events and never reach the drain outcome
//! - bookkeeping failures ([`DispatchError`]) fail the current drain cycle

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::builder::DispatcherBuilder;
use crate::core::config::DispatcherConfig;
use crate::core::drain::{DrainOutcome, DrainSignal};
use crate::error::DispatchError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::subscriber_set::panic_message;
use crate::work::WorkItem;

/// Snapshot of one in-flight work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningItem {
    /// Dispatcher-generated launch id.
    pub launch: u64,
    /// Work name.
    pub name: Arc<str>,
    /// When the item was admitted.
    pub started_at: Instant,
}

/// Admitted item on its way to a slot worker.
struct Launch {
    id: u64,
    name: Arc<str>,
    item: WorkItem,
    pending: usize,
    running: usize,
}

/// Everything a refill pass decided while holding the lock.
struct Step {
    launches: Vec<Launch>,
    /// Old signal to resolve, with its outcome.
    resolve: Option<(DrainSignal, DrainOutcome)>,
    fault: Option<DispatchError>,
}

/// Mutable dispatcher state (guarded by one mutex).
struct State {
    pending: VecDeque<WorkItem>,
    running: HashMap<u64, RunningItem>,
    next_launch: u64,
    drain: DrainSignal,
}

/// Bounded-parallelism work dispatcher with drain notification.
///
/// ## Example
/// ```rust
/// use taskdrain::{Dispatcher, DispatcherConfig, WorkError, WorkFn};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), taskdrain::DispatchError> {
///     let dispatcher = Dispatcher::new(DispatcherConfig::with_max_parallel(2));
///
///     for i in 0..5 {
///         dispatcher.enqueue(WorkFn::boxed(format!("job-{i}"), || async {
///             Ok::<_, WorkError>(())
///         }));
///     }
///
///     dispatcher.process().await?;
///     assert_eq!(dispatcher.pending_count(), 0);
///     assert_eq!(dispatcher.running_count(), 0);
///     Ok(())
/// }
/// ```
pub struct Dispatcher {
    cfg: DispatcherConfig,
    bus: Bus,
    state: Mutex<State>,
    runtime_token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Creates a dispatcher without subscribers.
    ///
    /// Does not spawn anything, so it may be called outside a runtime; `process`
    /// must be called from within one.
    pub fn new(cfg: DispatcherConfig) -> Arc<Self> {
        DispatcherBuilder::new(cfg).build()
    }

    /// Returns a builder for a dispatcher with subscribers.
    pub fn builder(cfg: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: DispatcherConfig,
        bus: Bus,
        runtime_token: CancellationToken,
        listener: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            cfg,
            bus,
            state: Mutex::new(State {
                pending: VecDeque::new(),
                running: HashMap::new(),
                next_launch: 0,
                drain: DrainSignal::new(),
            }),
            runtime_token,
            listener: Mutex::new(listener),
        }
    }

    /// Returns the dispatcher configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.cfg
    }

    /// Returns the event bus (subscribe to observe raw events).
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Appends `item` to the pending queue.
    ///
    /// Returns `false` (dropping the item, no other side effects) when the queue
    /// already holds `max_queue_length` items. Never blocks and never starts work:
    /// call [`process`](Self::process) to drive the queue.
    pub fn enqueue(&self, item: WorkItem) -> bool {
        let name: Arc<str> = Arc::from(item.name());

        let (accepted, pending) = {
            let mut st = self.lock();
            if st.pending.len() < self.cfg.queue_limit() {
                st.pending.push_back(item);
                (true, st.pending.len())
            } else {
                (false, st.pending.len())
            }
        };

        let kind = if accepted {
            EventKind::ItemEnqueued
        } else {
            EventKind::ItemRejected
        };
        let mut ev = Event::new(kind).with_item(name);
        ev.pending = Some(pending);
        self.bus.publish(ev);

        accepted
    }

    /// Number of items waiting to start.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of items currently running.
    pub fn running_count(&self) -> usize {
        self.lock().running.len()
    }

    /// Snapshot of in-flight items, ordered by launch id.
    pub fn running(&self) -> Vec<RunningItem> {
        let mut items: Vec<RunningItem> = self.lock().running.values().cloned().collect();
        items.sort_unstable_by_key(|r| r.launch);
        items
    }

    /// Starts draining the queue and returns the signal for the current drain cycle.
    ///
    /// The signal is snapshotted **before** the first refill pass, so a drain that
    /// completes during that pass still resolves the returned signal. Items enqueued
    /// while the cycle is in progress are picked up by running slot workers.
    ///
    /// Calling `process` on an idle dispatcher resolves immediately.
    pub fn process(self: &Arc<Self>) -> DrainSignal {
        let signal = self.lock().drain.clone();
        self.drive();
        signal
    }

    /// Fire-and-forget variant of [`process`](Self::process).
    ///
    /// `on_fatal` runs only if the drain cycle fails with a [`DispatchError`];
    /// individual item failures never reach it.
    pub fn process_in_background<F>(self: &Arc<Self>, on_fatal: F) -> JoinHandle<()>
    where
        F: FnOnce(DispatchError) + Send + 'static,
    {
        let signal = self.process();
        tokio::spawn(async move {
            if let Err(e) = signal.await {
                on_fatal(e);
            }
        })
    }

    /// Stops forwarding events to subscribers and waits until they have handled
    /// every event published before the call.
    ///
    /// Work keeps running and later events still reach [`bus`](Self::bus); only
    /// subscriber delivery ends. Calling it again is a no-op.
    pub async fn close(&self) {
        self.runtime_token.cancel();
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = listener {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "subscriber listener ended abnormally");
            }
        }
    }

    /// One refill pass: admit what fits, detect drain, launch.
    ///
    /// Idempotent: with nothing pending and no freed capacity it changes no counts.
    pub(crate) fn drive(self: &Arc<Self>) {
        let step = {
            let mut st = self.lock();
            self.refill(&mut st, None)
        };
        for launch in self.settle(step) {
            self.spawn_worker(launch);
        }
    }

    /// Admits pending items into free slots and detects the end of a drain cycle.
    ///
    /// Must be called with the state lock held; `fault` carries an error detected
    /// earlier in the same critical section.
    fn refill(&self, st: &mut State, mut fault: Option<DispatchError>) -> Step {
        let mut launches = Vec::new();
        let free = self.cfg.parallel_limit().saturating_sub(st.running.len());

        for _ in 0..free {
            if st.pending.is_empty() {
                break;
            }
            let id = st.next_launch;
            let Some(next) = id.checked_add(1) else {
                fault.get_or_insert(DispatchError::LaunchIdsExhausted);
                break;
            };
            if st.running.contains_key(&id) {
                // Skip the taken id so only this cycle fails; the item stays queued.
                st.next_launch = next;
                fault.get_or_insert(DispatchError::LaunchIdCollision { id });
                break;
            }
            let Some(item) = st.pending.pop_front() else {
                break;
            };
            st.next_launch = next;

            let name: Arc<str> = Arc::from(item.name());
            st.running.insert(
                id,
                RunningItem {
                    launch: id,
                    name: name.clone(),
                    started_at: Instant::now(),
                },
            );
            launches.push(Launch {
                id,
                name,
                item,
                pending: st.pending.len(),
                running: st.running.len(),
            });
        }

        let resolve = match &fault {
            Some(e) => Some((swap_signal(st), Err(e.clone()))),
            None if st.pending.is_empty() && st.running.is_empty() => {
                Some((swap_signal(st), Ok(())))
            }
            None => None,
        };

        Step {
            launches,
            resolve,
            fault,
        }
    }

    /// Applies the lock-free half of a refill pass and returns the admitted items.
    fn settle(&self, step: Step) -> Vec<Launch> {
        let Step {
            launches,
            resolve,
            fault,
        } = step;

        if let Some(e) = &fault {
            tracing::error!(error = %e, label = e.as_label(), "drain cycle failed");
            let mut ev = Event::new(EventKind::DispatchFailed).with_reason(e.as_label());
            if let DispatchError::LaunchIdCollision { id } | DispatchError::UnknownLaunch { id } = e
            {
                ev = ev.with_launch(*id);
            }
            self.bus.publish(ev);
        }

        if let Some((signal, outcome)) = resolve {
            // Published first, so a waiter that closes right away still flushes it.
            if outcome.is_ok() {
                tracing::debug!("dispatcher drained");
                self.bus.publish(Event::new(EventKind::Drained).with_counts(0, 0));
            }
            signal.resolve(outcome);
        }

        for l in &launches {
            tracing::debug!(item = %l.name, launch = l.id, "launching work item");
            self.bus.publish(
                Event::new(EventKind::ItemStarting)
                    .with_item(l.name.clone())
                    .with_launch(l.id)
                    .with_counts(l.pending, l.running),
            );
        }
        launches
    }

    fn spawn_worker(self: &Arc<Self>, first: Launch) {
        let me = Arc::clone(self);
        tokio::spawn(async move { me.slot_worker(first).await });
    }

    /// Runs admitted items back-to-back until a refill pass yields nothing.
    async fn slot_worker(self: Arc<Self>, first: Launch) {
        let mut current = first;
        loop {
            let id = current.id;
            self.run_item(current).await;

            let step = {
                let mut st = self.lock();
                let fault = match st.running.remove(&id) {
                    Some(_) => None,
                    None => Some(DispatchError::UnknownLaunch { id }),
                };
                self.refill(&mut st, fault)
            };

            let mut admitted = self.settle(step).into_iter();
            let Some(next) = admitted.next() else {
                break;
            };
            for launch in admitted {
                self.spawn_worker(launch);
            }
            current = next;
        }
    }

    /// Runs one item, containing panics, and publishes its outcome.
    async fn run_item(&self, launch: Launch) {
        let Launch { id, name, item, .. } = launch;

        let res = AssertUnwindSafe(async move { item.run().await })
            .catch_unwind()
            .await;

        let ev = match res {
            Ok(Ok(())) => Event::new(EventKind::ItemCompleted),
            Ok(Err(e)) => Event::new(EventKind::ItemFailed).with_reason(e.to_string()),
            Err(panic_err) => {
                let info = panic_message(&*panic_err);
                tracing::warn!(item = %name, launch = id, panic = %info, "work item panicked");
                Event::new(EventKind::ItemPanicked).with_reason(info)
            }
        };
        self.bus.publish(ev.with_item(name).with_launch(id));
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Every critical section leaves `State` consistent, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}

/// Installs a fresh drain signal and returns the old one (caller resolves it after unlocking).
fn swap_signal(st: &mut State) -> DrainSignal {
    std::mem::replace(&mut st.drain, DrainSignal::new())
}

#[cfg(test)]
impl Dispatcher {
    /// Plants a fake running entry so the next admission collides with it.
    fn plant_running(&self, id: u64) {
        self.lock().running.insert(
            id,
            RunningItem {
                launch: id,
                name: Arc::from("planted"),
                started_at: Instant::now(),
            },
        );
    }

    /// Drops a running entry behind its worker's back.
    fn forget_running(&self, id: u64) -> bool {
        self.lock().running.remove(&id).is_some()
    }

    fn current_signal(&self) -> DrainSignal {
        self.lock().drain.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkError;
    use crate::work::WorkFn;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Tracks how many items are inside their body at once.
    #[derive(Default)]
    struct Gauge {
        now: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.now.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.now.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn timed(name: String, gauge: Arc<Gauge>, dur: Duration) -> WorkItem {
        WorkFn::boxed(name, move || async move {
            gauge.enter();
            tokio::time::sleep(dur).await;
            gauge.leave();
            Ok::<(), WorkError>(())
        })
    }

    fn gated(name: &'static str, gate: Arc<Semaphore>, done: Arc<AtomicUsize>) -> WorkItem {
        WorkFn::boxed(name, move || async move {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
            done.fetch_add(1, Ordering::SeqCst);
            Ok::<(), WorkError>(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn two_slots_five_items() {
        let dispatcher = Dispatcher::new(DispatcherConfig::with_max_parallel(2));
        let gauge = Arc::new(Gauge::default());

        for i in 0..5 {
            assert!(dispatcher.enqueue(timed(
                format!("item-{i}"),
                gauge.clone(),
                Duration::from_millis(100)
            )));
        }

        let signal = dispatcher.process();
        assert_eq!(dispatcher.running_count(), 2);
        assert_eq!(dispatcher.pending_count(), 3);

        let mut ticks = 0;
        while !signal.is_resolved() {
            assert!(dispatcher.running_count() <= 2);
            tokio::time::sleep(Duration::from_millis(10)).await;
            ticks += 1;
        }

        assert_eq!(signal.await, Ok(()));
        assert_eq!(gauge.done.load(Ordering::SeqCst), 5);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
        assert!(ticks >= 29, "resolved too early after {ticks} ticks");
        assert_eq!(dispatcher.pending_count(), 0);
        assert_eq!(dispatcher.running_count(), 0);
    }

    #[tokio::test]
    async fn queue_limit_rejects_without_side_effects() {
        let dispatcher = Dispatcher::new(DispatcherConfig {
            max_queue_length: 3,
            ..DispatcherConfig::default()
        });
        let mut events = dispatcher.bus().subscribe();
        let noop = |n: &'static str| WorkFn::boxed(n, || async { Ok::<(), WorkError>(()) });

        assert!(dispatcher.enqueue(noop("a")));
        assert!(dispatcher.enqueue(noop("b")));
        assert!(dispatcher.enqueue(noop("c")));
        assert!(!dispatcher.enqueue(noop("d")));
        assert_eq!(dispatcher.pending_count(), 3);

        let kinds: Vec<EventKind> = (0..4).map(|_| events.try_recv().unwrap().kind).collect();
        assert_eq!(kinds[3], EventKind::ItemRejected);

        dispatcher.process().await.unwrap();
        assert!(dispatcher.enqueue(noop("e")));
    }

    #[tokio::test]
    async fn process_on_idle_dispatcher_resolves_immediately() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let signal = dispatcher.process();
        assert_eq!(signal.outcome(), Some(Ok(())));
        assert!(!dispatcher.current_signal().same_cycle(&signal));
    }

    #[tokio::test]
    async fn admits_in_fifo_order() {
        let dispatcher = Dispatcher::new(DispatcherConfig::with_max_parallel(1));
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = order.clone();
            dispatcher.enqueue(WorkFn::boxed(name, move || async move {
                order.lock().unwrap().push(name);
                Ok::<(), WorkError>(())
            }));
        }

        dispatcher.process().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn drive_without_pending_work_is_a_no_op() {
        let dispatcher = Dispatcher::new(DispatcherConfig::with_max_parallel(1));
        let gate = Arc::new(Semaphore::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        dispatcher.enqueue(gated("a", gate.clone(), done.clone()));
        dispatcher.enqueue(gated("b", gate.clone(), done.clone()));
        let signal = dispatcher.process();
        let running = dispatcher.running();

        for _ in 0..5 {
            dispatcher.drive();
            assert_eq!(dispatcher.running_count(), 1);
            assert_eq!(dispatcher.pending_count(), 1);
        }
        assert_eq!(dispatcher.running(), running);
        assert!(!signal.is_resolved());

        gate.add_permits(2);
        signal.await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn items_enqueued_mid_drain_run_before_it_resolves() {
        let dispatcher = Dispatcher::new(DispatcherConfig::with_max_parallel(2));
        let gate = Arc::new(Semaphore::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        dispatcher.enqueue(gated("a", gate.clone(), done.clone()));
        dispatcher.enqueue(gated("b", gate.clone(), done.clone()));
        let signal = dispatcher.process();

        for name in ["c", "d", "e"] {
            assert!(dispatcher.enqueue(gated(name, gate.clone(), done.clone())));
        }
        gate.add_permits(5);

        signal.await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn later_waiters_get_a_fresh_signal() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let gate = Arc::new(Semaphore::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        dispatcher.enqueue(gated("a", gate.clone(), done.clone()));
        let first = dispatcher.process();
        let joined = dispatcher.process();
        assert!(first.same_cycle(&joined));

        gate.add_permits(1);
        first.clone().await.unwrap();
        assert!(joined.is_resolved());

        dispatcher.enqueue(gated("b", gate.clone(), done.clone()));
        let second = dispatcher.process();
        assert!(!second.same_cycle(&first));
        assert!(!second.is_resolved());

        gate.add_permits(1);
        second.await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_and_panicking_items_do_not_stop_the_drain() {
        let dispatcher = Dispatcher::new(DispatcherConfig::with_max_parallel(2));
        let mut events = dispatcher.bus().subscribe();
        let done = Arc::new(AtomicUsize::new(0));

        dispatcher.enqueue(WorkFn::boxed("fails", || async {
            Err::<(), _>(WorkError::fail("exit status: 1"))
        }));
        dispatcher.enqueue(WorkFn::boxed("panics", || async {
            let crash = true;
            if crash {
                panic!("converter crashed");
            }
            Ok::<(), WorkError>(())
        }));
        for name in ["ok-1", "ok-2", "ok-3"] {
            let done = done.clone();
            dispatcher.enqueue(WorkFn::boxed(name, move || async move {
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<(), WorkError>(())
            }));
        }

        assert_eq!(dispatcher.process().await, Ok(()));
        assert_eq!(done.load(Ordering::SeqCst), 3);

        let mut failed = None;
        let mut panicked = None;
        while let Ok(ev) = events.try_recv() {
            match ev.kind {
                EventKind::ItemFailed => failed = ev.reason,
                EventKind::ItemPanicked => panicked = ev.reason,
                _ => {}
            }
        }
        assert_eq!(failed.as_deref(), Some("execution failed: exit status: 1"));
        assert_eq!(panicked.as_deref(), Some("converter crashed"));
    }

    #[tokio::test]
    async fn launch_id_collision_fails_the_cycle() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        dispatcher.plant_running(0);
        dispatcher.enqueue(WorkFn::boxed("a", || async { Ok::<(), WorkError>(()) }));

        let res = dispatcher.process().await;
        assert_eq!(res, Err(DispatchError::LaunchIdCollision { id: 0 }));
        assert_eq!(dispatcher.pending_count(), 1, "item must stay queued");
        assert!(!dispatcher.current_signal().is_resolved());
    }

    #[tokio::test]
    async fn collision_fails_only_its_own_cycle() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let done = Arc::new(AtomicUsize::new(0));
        dispatcher.plant_running(0);

        let counter = done.clone();
        dispatcher.enqueue(WorkFn::boxed("a", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), WorkError>(())
        }));
        assert_eq!(
            dispatcher.process().await,
            Err(DispatchError::LaunchIdCollision { id: 0 })
        );

        assert!(dispatcher.forget_running(0));
        assert_eq!(dispatcher.process().await, Ok(()));
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.pending_count(), 0);
        assert_eq!(dispatcher.running_count(), 0);
    }

    #[tokio::test]
    async fn unknown_launch_on_completion_fails_the_cycle() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let gate = Arc::new(Semaphore::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        dispatcher.enqueue(gated("a", gate.clone(), done.clone()));
        let signal = dispatcher.process();
        assert!(dispatcher.forget_running(0));
        gate.add_permits(1);

        assert_eq!(signal.await, Err(DispatchError::UnknownLaunch { id: 0 }));
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn background_handler_only_sees_fatal_failures() {
        let dispatcher = Dispatcher::new(DispatcherConfig::with_max_parallel(1));
        let called = Arc::new(AtomicBool::new(false));

        dispatcher.enqueue(WorkFn::boxed("fails", || async {
            Err::<(), _>(WorkError::fatal("missing converter"))
        }));
        let flag = called.clone();
        dispatcher
            .process_in_background(move |_| flag.store(true, Ordering::SeqCst))
            .await
            .unwrap();
        assert!(!called.load(Ordering::SeqCst));

        // A second dispatcher with free slots, so admission reaches the taken id.
        let colliding = Dispatcher::new(DispatcherConfig::default());
        colliding.plant_running(0);
        colliding.enqueue(WorkFn::boxed("a", || async { Ok::<(), WorkError>(()) }));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let bg = colliding.process_in_background(move |e| {
            let _ = tx.send(e);
        });
        assert_eq!(rx.await.unwrap(), DispatchError::LaunchIdCollision { id: 0 });
        bg.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_completions_never_exceed_the_cap() {
        const CAP: usize = 3;

        for _round in 0..20 {
            let dispatcher = Dispatcher::new(DispatcherConfig::with_max_parallel(CAP));
            let gauge = Arc::new(Gauge::default());
            let observed = Arc::new(AtomicUsize::new(0));

            for i in 0..200 {
                let gauge = gauge.clone();
                let observed = observed.clone();
                let watcher = Arc::downgrade(&dispatcher);
                dispatcher.enqueue(WorkFn::boxed(format!("item-{i}"), move || async move {
                    gauge.enter();
                    if let Some(d) = watcher.upgrade() {
                        observed.fetch_max(d.running_count(), Ordering::SeqCst);
                    }
                    tokio::task::yield_now().await;
                    gauge.leave();
                    Ok::<(), WorkError>(())
                }));
            }

            assert_eq!(dispatcher.process().await, Ok(()));
            assert!(gauge.peak.load(Ordering::SeqCst) <= CAP);
            assert!(observed.load(Ordering::SeqCst) <= CAP);
            assert_eq!(gauge.done.load(Ordering::SeqCst), 200);
            assert_eq!(dispatcher.pending_count(), 0);
            assert_eq!(dispatcher.running_count(), 0);
        }
    }
}
