//! # Work abstractions.
//!
//! This module provides the units the dispatcher runs:
//! - [`Work`] - trait for a one-shot async unit of work
//! - [`WorkFn`] - closure-backed implementation
//! - [`WorkItem`] - boxed work as stored in the pending queue
//! - [`CommandWork`] - one external process invocation with a completion reporter

mod command;
mod work;
mod work_fn;

pub use command::{CommandWork, Completion, Reporter};
pub use work::{BoxWorkFuture, Work, WorkItem};
pub use work_fn::WorkFn;
