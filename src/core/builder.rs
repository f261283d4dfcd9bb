//! # Dispatcher builder.
//!
//! Wires a [`Dispatcher`] together with its event bus and, when subscribers are
//! given, a listener task that fans bus events out through a [`SubscriberSet`].
//!
//! ```text
//! build()
//!   ├─► Bus::new(cfg.bus_capacity_clamped())
//!   ├─► subscribers non-empty?
//!   │     └─► SubscriberSet::new(subs) + listener: Bus ─► SubscriberSet::emit
//!   │             (stops on Dispatcher::close or drop, flushing what it already saw)
//!   └─► Dispatcher::new_internal(cfg, bus, runtime_token, listener)
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{config::DispatcherConfig, dispatcher::Dispatcher};
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`Dispatcher`] with optional subscribers.
pub struct DispatcherBuilder {
    cfg: DispatcherConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl DispatcherBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: DispatcherConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive dispatcher events (enqueue, launch, completion, drain)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the dispatcher.
    ///
    /// Spawns the subscriber listener when subscribers were given, so in that case
    /// it must be called from within a tokio runtime.
    pub fn build(self) -> Arc<Dispatcher> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let runtime_token = CancellationToken::new();

        let listener = (!self.subscribers.is_empty()).then(|| {
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            spawn_listener(&bus, subs, runtime_token.clone())
        });

        Arc::new(Dispatcher::new_internal(
            self.cfg,
            bus,
            runtime_token,
            listener,
        ))
    }
}

/// Forwards bus events to the subscriber set until the dispatcher goes away.
fn spawn_listener(bus: &Bus, subs: SubscriberSet, token: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(&ev),
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event listener lagged");
                    }
                }
            }
        }

        while let Ok(ev) = rx.try_recv() {
            subs.emit(&ev);
        }
        subs.shutdown().await;
    })
}
