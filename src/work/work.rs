//! # One-shot unit of work.
//!
//! A [`Work`] is consumed when it runs: the dispatcher owns it from
//! [`enqueue`](crate::Dispatcher::enqueue) until its future completes, then drops it.
//! It is never restarted and never re-queued.

use std::future::Future;
use std::pin::Pin;

use crate::error::WorkError;

/// Boxed future returned by [`Work::run`].
pub type BoxWorkFuture = Pin<Box<dyn Future<Output = Result<(), WorkError>> + Send + 'static>>;

/// Owned work item as held by the pending queue.
pub type WorkItem = Box<dyn Work>;

/// # Asynchronous, parameterless unit of work.
///
/// The result is published as an event and otherwise ignored by the dispatcher.
/// Work that must report its outcome to a caller should do so through its own
/// channel (see [`CommandWork`](crate::CommandWork) and its reporter).
///
/// # Example
/// ```
/// use taskdrain::{BoxWorkFuture, Work, WorkError};
///
/// struct Noop;
///
/// impl Work for Noop {
///     fn name(&self) -> &str { "noop" }
///
///     fn run(self: Box<Self>) -> BoxWorkFuture {
///         Box::pin(async { Ok::<(), WorkError>(()) })
///     }
/// }
/// ```
pub trait Work: Send + 'static {
    /// Returns a human-readable name (for events and logs).
    fn name(&self) -> &str;

    /// Consumes the work and returns the future that performs it.
    fn run(self: Box<Self>) -> BoxWorkFuture;
}
