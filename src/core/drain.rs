//! # Re-armable drain signal.
//!
//! A [`DrainSignal`] is a single-fulfillment notification shared by every caller
//! that snapshotted it. The dispatcher keeps exactly one *current* signal in its
//! state; when a drain cycle ends it installs a fresh signal under the state lock
//! and only then resolves the old one:
//!
//! ```text
//! process() ─► snapshot current (S1) ─► drive()
//!                                          │
//!             ... last item completes ... ─┤ lock: swap S1 → S2
//!                                          │ unlock
//!                                          └─► S1.resolve(Ok)   → every S1 waiter wakes
//!
//! later process() ─► snapshot current (S2)  (never sees the stale S1)
//! ```
//!
//! Waiting uses [`tokio::sync::Notify`]: the `Notified` future is created before the
//! outcome is checked, so a resolve racing with a fresh waiter is never lost.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;

use crate::error::DispatchError;

/// Result delivered to drain waiters.
pub type DrainOutcome = Result<(), DispatchError>;

struct Inner {
    outcome: OnceLock<DrainOutcome>,
    notify: Notify,
}

/// Awaitable "all work drained" notification for one drain cycle.
///
/// Returned by [`Dispatcher::process`](crate::Dispatcher::process). Await it directly
/// (it implements [`IntoFuture`]) or call [`DrainSignal::wait`] on a clone.
#[derive(Clone)]
pub struct DrainSignal {
    inner: Arc<Inner>,
}

impl DrainSignal {
    /// Creates a new unresolved signal.
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                outcome: OnceLock::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Resolves the signal and wakes all waiters.
    ///
    /// Returns `false` if the signal was already resolved (the first outcome wins).
    pub(crate) fn resolve(&self, outcome: DrainOutcome) -> bool {
        let first = self.inner.outcome.set(outcome).is_ok();
        self.inner.notify.notify_waiters();
        first
    }

    /// Returns `true` once the drain cycle this signal belongs to has ended.
    pub fn is_resolved(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    /// Returns the outcome without waiting, if already resolved.
    pub fn outcome(&self) -> Option<DrainOutcome> {
        self.inner.outcome.get().cloned()
    }

    /// Waits until the signal is resolved and returns its outcome.
    pub async fn wait(&self) -> DrainOutcome {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(outcome) = self.inner.outcome.get() {
                return outcome.clone();
            }
            notified.await;
        }
    }

    /// Returns `true` if both handles refer to the same drain cycle.
    pub fn same_cycle(&self, other: &DrainSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for DrainSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainSignal")
            .field("outcome", &self.inner.outcome.get())
            .finish()
    }
}

impl IntoFuture for DrainSignal {
    type Output = DrainOutcome;
    type IntoFuture = Pin<Box<dyn Future<Output = DrainOutcome> + Send + 'static>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wakes_waiters_registered_before_resolve() {
        let signal = DrainSignal::new();
        let waiter = tokio::spawn(signal.clone().into_future());
        tokio::task::yield_now().await;

        assert!(signal.resolve(Ok(())));
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn resolved_signal_returns_immediately() {
        let signal = DrainSignal::new();
        signal.resolve(Err(DispatchError::LaunchIdsExhausted));

        assert_eq!(signal.wait().await, Err(DispatchError::LaunchIdsExhausted));
        assert_eq!(signal.outcome(), Some(Err(DispatchError::LaunchIdsExhausted)));
    }

    #[test]
    fn first_outcome_wins() {
        let signal = DrainSignal::new();
        assert!(signal.resolve(Ok(())));
        assert!(!signal.resolve(Err(DispatchError::LaunchIdsExhausted)));
        assert_eq!(signal.outcome(), Some(Ok(())));
    }

    #[test]
    fn clones_share_a_cycle() {
        let a = DrainSignal::new();
        let b = a.clone();
        assert!(a.same_cycle(&b));
        assert!(!a.same_cycle(&DrainSignal::new()));
    }
}
