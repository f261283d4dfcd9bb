//! # Dispatcher configuration.
//!
//! Provides [`DispatcherConfig`], the centralized settings for a [`Dispatcher`](crate::Dispatcher).
//!
//! ## Sentinel values
//! - `max_parallel = 0` → unlimited concurrent items
//! - `max_queue_length = 0` → unlimited pending queue

/// Configuration for a dispatcher.
///
/// ## Field semantics
/// - `max_parallel`: upper bound on items running at once (`0` = unlimited)
/// - `max_queue_length`: upper bound on pending items (`0` = unlimited)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Maximum number of work items running concurrently.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = at most `n` items run simultaneously
    pub max_parallel: usize,

    /// Maximum number of items waiting in the pending queue.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = `enqueue` returns `false` once `n` items are pending
    pub max_queue_length: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages skip
    /// older items. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,
}

impl DispatcherConfig {
    /// Default configuration with the given parallelism cap.
    ///
    /// # Example
    /// ```
    /// use taskdrain::DispatcherConfig;
    ///
    /// let cfg = DispatcherConfig::with_max_parallel(5);
    /// assert_eq!(cfg.parallel_limit(), 5);
    /// assert_eq!(cfg.queue_limit(), usize::MAX);
    /// ```
    pub fn with_max_parallel(max_parallel: usize) -> Self {
        Self {
            max_parallel,
            ..Self::default()
        }
    }

    /// Returns the effective parallelism cap (`usize::MAX` when unlimited).
    #[inline]
    pub fn parallel_limit(&self) -> usize {
        match self.max_parallel {
            0 => usize::MAX,
            n => n,
        }
    }

    /// Returns the effective pending queue cap (`usize::MAX` when unlimited).
    #[inline]
    pub fn queue_limit(&self) -> usize {
        match self.max_queue_length {
            0 => usize::MAX,
            n => n,
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for DispatcherConfig {
    /// Default configuration:
    ///
    /// - `max_parallel = 0` (unlimited)
    /// - `max_queue_length = 0` (unlimited)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            max_parallel: 0,
            max_queue_length: 0,
            bus_capacity: 1024,
        }
    }
}
