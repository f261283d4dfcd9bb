//! # LogWriter - event logger
//!
//! A minimal subscriber that renders incoming [`Event`]s through `tracing`.
//! Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see the output.
//!
//! ## Example output
//! ```text
//! INFO  [enqueued] item="Item" pending=1
//! WARN  [rejected] item="Stage" pending=3
//! INFO  [starting] item="Item" launch=0 pending=0 running=1
//! INFO  [completed] item="Item" launch=0
//! WARN  [failed] item="Enemy" launch=1 err="exit status: 1"
//! INFO  [drained]
//! ERROR [dispatch-failed] launch=4 err="dispatch_unknown_launch"
//! ```

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let item = e.item.as_deref().unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ItemEnqueued => {
                info!("[enqueued] item={item:?} pending={:?}", e.pending);
            }
            EventKind::ItemRejected => {
                warn!("[rejected] item={item:?} pending={:?}", e.pending);
            }
            EventKind::ItemStarting => {
                info!(
                    "[starting] item={item:?} launch={:?} pending={:?} running={:?}",
                    e.launch, e.pending, e.running
                );
            }
            EventKind::ItemCompleted => {
                info!("[completed] item={item:?} launch={:?}", e.launch);
            }
            EventKind::ItemFailed => {
                warn!("[failed] item={item:?} launch={:?} err={reason:?}", e.launch);
            }
            EventKind::ItemPanicked => {
                error!("[panicked] item={item:?} launch={:?} info={reason:?}", e.launch);
            }
            EventKind::Drained => {
                info!("[drained]");
            }
            EventKind::DispatchFailed => {
                error!("[dispatch-failed] launch={:?} err={reason:?}", e.launch);
            }
            EventKind::SubscriberOverflow => {
                warn!("[subscriber-overflow] subscriber={item} reason={reason}");
            }
            EventKind::SubscriberPanicked => {
                error!("[subscriber-panicked] subscriber={item} info={reason}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
