//! # Function-backed work (`WorkFn`)
//!
//! [`WorkFn`] wraps a closure `F: FnOnce() -> Fut`. The closure is called exactly
//! once, when the dispatcher launches the item.
//!
//! ## Example
//! ```rust
//! use taskdrain::{WorkError, WorkFn, WorkItem};
//!
//! let item: WorkItem = WorkFn::boxed("hello", || async {
//!     Ok::<_, WorkError>(())
//! });
//!
//! assert_eq!(item.name(), "hello");
//! ```

use std::borrow::Cow;
use std::future::Future;

use crate::error::WorkError;
use crate::work::work::{BoxWorkFuture, Work, WorkItem};

/// Closure-backed work implementation.
pub struct WorkFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> WorkFn<F> {
    /// Creates a new function-backed work item.
    ///
    /// Prefer [`WorkFn::boxed`] when you immediately need a [`WorkItem`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F, Fut> WorkFn<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
{
    /// Creates the work and returns it boxed, ready for
    /// [`Dispatcher::enqueue`](crate::Dispatcher::enqueue).
    pub fn boxed(name: impl Into<Cow<'static, str>>, f: F) -> WorkItem {
        Box::new(Self::new(name, f))
    }
}

impl<F, Fut> Work for WorkFn<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>) -> BoxWorkFuture {
        Box::pin((self.f)())
    }
}
