//! # taskdrain
//!
//! **taskdrain** is a bounded-parallelism work dispatcher for tokio.
//!
//! Work items are queued FIFO, launched up to a configured parallelism cap, and
//! refilled automatically as each one completes. Callers await a single drain
//! signal that fires once nothing is pending and nothing is running, including
//! work that was enqueued while the drain was already in progress.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   WorkItem   │   │   WorkItem   │   │   WorkItem   │
//!     │ (master #1)  │   │ (master #2)  │   │ (master #3)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼ enqueue()        ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Dispatcher                                                       │
//! │  - PendingQueue (FIFO, optionally bounded)                        │
//! │  - RunningSet   (LaunchId → RunningItem, ≤ max_parallel)          │
//! │  - DrainSignal  (swapped on every drain)                          │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │ slot worker  │   │ slot worker  │   │ slot worker  │   │
//!     │ (refill loop)│   │ (refill loop)│   │ (refill loop)│   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ Publishes:       │                  │                 │
//!      │ - ItemStarting   │ - ItemFailed     │ - ItemPanicked  │ - Drained
//!      │ - ItemCompleted  │                  │                 │ - DispatchFailed
//!      ▼                  ▼                  ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                        (per-subscriber queues)
//! ```
//!
//! ### Lifecycle
//! ```text
//! per item:        Pending ──► Running ──► Completed
//! per dispatcher:  Idle ──► Draining ──► Idle      (DrainSignal fires on Draining → Idle)
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types                                |
//! |-------------------|----------------------------------------------------------|------------------------------------------|
//! | **Dispatch**      | Bounded, self-refilling FIFO runner with drain signal.   | [`Dispatcher`], [`DrainSignal`]          |
//! | **Work**          | One-shot async units, closures and external processes.   | [`Work`], [`WorkFn`], [`CommandWork`]    |
//! | **Subscriber API**| Hook into dispatcher events (logging, progress).         | [`Subscribe`], [`SubscriberSet`]         |
//! | **Errors**        | Typed errors for dispatch bookkeeping and work items.    | [`DispatchError`], [`WorkError`]         |
//! | **Configuration** | Parallelism and queue limits.                            | [`DispatcherConfig`]                     |
//!
//! ## Optional features
//! - `logging`: exports the [`LogWriter`] subscriber that renders events via `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use taskdrain::{Dispatcher, DispatcherConfig, WorkError, WorkFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Dispatcher::new(DispatcherConfig {
//!         max_parallel: 5,
//!         max_queue_length: 100,
//!         ..DispatcherConfig::default()
//!     });
//!
//!     let converted = Arc::new(AtomicUsize::new(0));
//!     for master in ["Item", "Enemy", "Stage"] {
//!         let converted = converted.clone();
//!         let accepted = dispatcher.enqueue(WorkFn::boxed(master, move || async move {
//!             converted.fetch_add(1, Ordering::SeqCst);
//!             Ok::<_, WorkError>(())
//!         }));
//!         assert!(accepted);
//!     }
//!
//!     dispatcher.process().await?;
//!     assert_eq!(converted.load(Ordering::SeqCst), 3);
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod subscribers;
mod work;

// ---- Public re-exports ----

pub use crate::core::{
    Dispatcher, DispatcherBuilder, DispatcherConfig, DrainOutcome, DrainSignal, RunningItem,
};
pub use error::{DispatchError, WorkError};
pub use events::{Bus, Event, EventKind};
pub use subscribers::{Subscribe, SubscriberSet};
pub use work::{BoxWorkFuture, CommandWork, Completion, Reporter, Work, WorkFn, WorkItem};

// Optional: expose a built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
