//! Error types used by the dispatcher and by work items.
//!
//! This module defines two error enums:
//!
//! - [`DispatchError`]: a broken bookkeeping invariant inside the dispatcher itself.
//! - [`WorkError`]: a failure reported by an individual work item.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//! A full queue is **not** an error: [`Dispatcher::enqueue`](crate::Dispatcher::enqueue)
//! simply returns `false`.

use thiserror::Error;

/// # Fatal dispatch failures.
///
/// These indicate a logic defect in the dispatcher's own bookkeeping. They terminate
/// the drain cycle in which they occur and are surfaced through the future returned by
/// [`Dispatcher::process`](crate::Dispatcher::process) or the handler passed to
/// [`Dispatcher::process_in_background`](crate::Dispatcher::process_in_background).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A freshly generated launch id was already present in the running set.
    #[error("launch id {id} collides with a running item")]
    LaunchIdCollision {
        /// The colliding id.
        id: u64,
    },

    /// A completed item's launch id was missing from the running set.
    #[error("launch id {id} is not in the running set")]
    UnknownLaunch {
        /// The id that could not be found.
        id: u64,
    },

    /// The launch id counter cannot produce another unique value.
    #[error("launch id counter exhausted")]
    LaunchIdsExhausted,
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskdrain::DispatchError;
    ///
    /// let err = DispatchError::UnknownLaunch { id: 7 };
    /// assert_eq!(err.as_label(), "dispatch_unknown_launch");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::LaunchIdCollision { .. } => "dispatch_launch_id_collision",
            DispatchError::UnknownLaunch { .. } => "dispatch_unknown_launch",
            DispatchError::LaunchIdsExhausted => "dispatch_launch_ids_exhausted",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DispatchError::LaunchIdCollision { id } => format!("launch id collision: {id}"),
            DispatchError::UnknownLaunch { id } => format!("unknown launch id: {id}"),
            DispatchError::LaunchIdsExhausted => "launch ids exhausted".to_string(),
        }
    }
}

/// # Errors reported by work items.
///
/// The dispatcher never acts on these beyond publishing an
/// [`EventKind::ItemFailed`](crate::EventKind::ItemFailed) event: a failing item
/// does not stop its slot, other items, or the drain.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkError {
    /// Work finished unsuccessfully.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Work could not even be started (missing binary, bad input, ...).
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },
}

impl WorkError {
    /// Convenience constructor for [`WorkError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        WorkError::Fail {
            error: error.into(),
        }
    }

    /// Convenience constructor for [`WorkError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        WorkError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskdrain::WorkError;
    ///
    /// assert_eq!(WorkError::fail("exit code 1").as_label(), "work_failed");
    /// assert_eq!(WorkError::fatal("not found").as_label(), "work_fatal");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkError::Fail { .. } => "work_failed",
            WorkError::Fatal { .. } => "work_fatal",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            WorkError::Fail { error } => format!("error: {error}"),
            WorkError::Fatal { error } => format!("fatal: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_error_display_includes_id() {
        let err = DispatchError::LaunchIdCollision { id: 42 };
        assert_eq!(err.to_string(), "launch id 42 collides with a running item");
        assert_eq!(err.as_message(), "launch id collision: 42");
    }

    #[test]
    fn work_error_messages() {
        let err = WorkError::fail("exit code 2");
        assert_eq!(err.to_string(), "execution failed: exit code 2");
        assert_eq!(err.as_message(), "error: exit code 2");

        let err = WorkError::fatal("no such file");
        assert_eq!(err.to_string(), "fatal error: no such file");
    }
}
