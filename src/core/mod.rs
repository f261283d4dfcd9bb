//! Dispatcher core: admission, refill and drain notification.
//!
//! The public API from this module is [`Dispatcher`] with its [`DispatcherBuilder`],
//! [`DispatcherConfig`] and the [`DrainSignal`] returned by `process`.
//!
//! Internal modules:
//! - [`dispatcher`]: pending queue, running set, slot workers;
//! - [`drain`]: re-armable drain signal;
//! - [`builder`]: wiring of bus, subscribers and dispatcher;
//! - [`config`]: limits and their sentinel values.

mod builder;
mod config;
mod dispatcher;
mod drain;

pub use builder::DispatcherBuilder;
pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, RunningItem};
pub use drain::{DrainOutcome, DrainSignal};
