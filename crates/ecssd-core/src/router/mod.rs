//! Event router
//!
//! The EventRouter is responsible for:
//! - Subscribing to the runtime's lifecycle event stream
//! - Bounding concurrent reconciliation to the worker pool size
//! - Handing each event to one worker with the handlers registered for its status
//! - Reporting handler failures and escalating fatal ones
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ EventSource │─── LifecycleEvent ───┐
//! └─────────────┘                      │ (buffered channel)
//!                                      ▼
//!                             ┌────────────────┐   acquire (timeout, retried)
//!                             │ dispatch loop  │◄──────────────┐
//!                             └────────────────┘               │
//!                                      │ spawn           ┌────────────┐
//!                                      ▼                 │ WorkerPool │
//!                             ┌────────────────┐ release └────────────┘
//!                             │    worker      │───────────────┘
//!                             └────────────────┘
//!                                      │
//!                                      ▼
//!                             HandlerRegistry → Handler → DnsProvider
//! ```
//!
//! ## Event Flow
//!
//! 1. The runtime delivers an event into the router's inbound channel
//! 2. The dispatch loop waits for a worker slot; each timeout is logged and
//!    the wait starts over, so events are never dropped
//! 3. The event and slot move into a spawned worker and the loop moves on
//! 4. The worker runs every handler registered for the event status in order
//! 5. The slot returns to the pool when the worker finishes, fails or panics

mod pool;

pub use pool::{WorkerPool, WorkerSlot};

use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::handlers::{HandlerOutcome, HandlerRegistry};
use crate::traits::{EventSource, LifecycleEvent};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Events emitted by the EventRouter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// Router subscribed to the runtime
    Started {
        pool_size: usize,
    },

    /// An event was handed to a worker
    Dispatched {
        event_id: String,
        status: String,
    },

    /// No worker freed up within the timeout; the router keeps waiting
    WorkerTimeout {
        event_id: String,
        waited: Duration,
    },

    /// A handler failed; later handlers and other events are unaffected
    HandlerFailed {
        event_id: String,
        status: String,
        handler: &'static str,
        error: String,
    },

    /// A worker ran every handler for an event
    Completed {
        event_id: String,
        status: String,
        handlers: usize,
    },

    /// A handler hit an unrecoverable error; the process owner must terminate
    Fatal {
        event_id: String,
        status: String,
        handler: &'static str,
        error: String,
    },

    /// Router unsubscribed from the runtime
    Stopped,
}

/// Monitoring channel shared by the dispatch loop and the workers
#[derive(Clone)]
struct Monitor {
    tx: mpsc::Sender<RouterEvent>,
}

impl Monitor {
    /// Emit an informational event
    fn emit(&self, event: RouterEvent) {
        // Monitoring must never block dispatch; a closed channel means nobody is watching
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(event) {
            warn!("Router event channel full, dropping event. Consider increasing monitor_channel_capacity.");
        }
    }

    /// Emit an event that must not be lost
    async fn escalate(&self, event: RouterEvent) {
        if self.tx.send(event).await.is_err() {
            error!("Fatal error raised but nobody is listening for router events");
        }
    }
}

/// Event router
///
/// Owns the inbound event channel, the worker pool and the handler registry.
///
/// ## Lifecycle
///
/// 1. Create with [`EventRouter::new()`]
/// 2. [`EventRouter::start()`] spawns the dispatch loop and subscribes
/// 3. [`EventRouter::stop()`] unsubscribes; queued and in-flight events
///    still complete
/// 4. Dropping the router aborts the dispatch loop
///
/// ## Concurrency
///
/// At most `worker_pool_size` events are reconciled at once. Events for
/// different instances may complete in any order; no per-instance
/// sequencing is applied.
pub struct EventRouter {
    /// Runtime event transport
    source: Arc<dyn EventSource>,

    /// Status-keyed handlers, read-only
    registry: Arc<HandlerRegistry>,

    /// Worker slots
    pool: WorkerPool,

    /// How long one slot acquisition waits before logging
    worker_timeout: Duration,

    /// Sending half registered with the event source
    listener: mpsc::Sender<LifecycleEvent>,

    /// Receiving half, taken by the dispatch loop on start
    inbound: Mutex<Option<mpsc::Receiver<LifecycleEvent>>>,

    /// Dispatch loop task
    dispatcher: Mutex<Option<JoinHandle<()>>>,

    /// Monitoring events
    monitor: Monitor,
}

impl EventRouter {
    /// Create a new event router
    ///
    /// # Parameters
    ///
    /// - `source`: Runtime event transport
    /// - `registry`: Handlers by event status
    /// - `config`: Router configuration
    ///
    /// # Returns
    ///
    /// A tuple of (router, event_receiver) where event_receiver yields router events
    pub fn new(
        source: Arc<dyn EventSource>,
        registry: HandlerRegistry,
        config: &RouterConfig,
    ) -> Result<(Self, mpsc::Receiver<RouterEvent>)> {
        config.validate()?;

        let (listener, inbound) = mpsc::channel(config.event_buffer_size);
        let (tx, rx) = mpsc::channel(config.monitor_channel_capacity);

        let router = Self {
            source,
            registry: Arc::new(registry),
            pool: WorkerPool::new(config.worker_pool_size),
            worker_timeout: config.worker_timeout(),
            listener,
            inbound: Mutex::new(Some(inbound)),
            dispatcher: Mutex::new(None),
            monitor: Monitor { tx },
        };

        Ok((router, rx))
    }

    /// Start routing events
    ///
    /// Spawns the dispatch loop, then registers the router's channel with
    /// the event source.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The router is subscribed
    /// - `Err(Error)`: The router was already started, or the event source
    ///   refused the listener
    pub async fn start(&self) -> Result<()> {
        let inbound = self
            .inbound
            .lock()
            .map_err(|_| Error::router("router state poisoned"))?
            .take()
            .ok_or_else(|| Error::router("router already started"))?;

        info!(
            source = self.source.source_name(),
            pool_size = self.pool.size(),
            statuses = ?self.registry.statuses(),
            "Starting event router"
        );

        let dispatcher = Dispatcher {
            registry: Arc::clone(&self.registry),
            pool: self.pool.clone(),
            worker_timeout: self.worker_timeout,
            monitor: self.monitor.clone(),
        };
        let handle = tokio::spawn(dispatcher.run(inbound));

        if let Err(e) = self.source.add_listener(self.listener.clone()).await {
            handle.abort();
            return Err(e);
        }

        if let Ok(mut guard) = self.dispatcher.lock() {
            *guard = Some(handle);
        }

        self.monitor.emit(RouterEvent::Started {
            pool_size: self.pool.size(),
        });
        Ok(())
    }

    /// Stop receiving events
    ///
    /// Deregisters from the event source. Events already queued or being
    /// reconciled are neither drained nor cancelled.
    pub async fn stop(&self) -> Result<()> {
        info!(source = self.source.source_name(), "Stopping event router");
        self.source.remove_listener(&self.listener).await?;
        self.monitor.emit(RouterEvent::Stopped);
        Ok(())
    }

    /// The router's worker pool
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl Drop for EventRouter {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.dispatcher.lock()
            && let Some(handle) = guard.take()
        {
            handle.abort();
        }
    }
}

/// State moved into the dispatch loop task
struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    pool: WorkerPool,
    worker_timeout: Duration,
    monitor: Monitor,
}

impl Dispatcher {
    async fn run(self, mut inbound: mpsc::Receiver<LifecycleEvent>) {
        while let Some(event) = inbound.recv().await {
            let Some(slot) = self.acquire_slot(&event).await else {
                return;
            };

            self.monitor.emit(RouterEvent::Dispatched {
                event_id: event.id.clone(),
                status: event.status.clone(),
            });

            let worker = Worker {
                registry: Arc::clone(&self.registry),
                monitor: self.monitor.clone(),
            };
            tokio::spawn(worker.run(event, slot));
        }
        debug!("Event channel closed, dispatch loop exiting");
    }

    /// Wait for a slot, starting the wait over after every timeout
    ///
    /// Returns `None` only if the pool was closed.
    async fn acquire_slot(&self, event: &LifecycleEvent) -> Option<WorkerSlot> {
        loop {
            match self.pool.acquire_timeout(self.worker_timeout).await {
                Ok(Some(slot)) => return Some(slot),
                Ok(None) => {
                    info!(
                        event_id = %event.short_id(),
                        status = %event.status,
                        timeout_secs = self.worker_timeout.as_secs(),
                        "Timed out waiting for worker. Re-initializing wait."
                    );
                    self.monitor.emit(RouterEvent::WorkerTimeout {
                        event_id: event.id.clone(),
                        waited: self.worker_timeout,
                    });
                }
                Err(e) => {
                    error!(error = %e, "Worker pool unavailable, dispatch loop exiting");
                    return None;
                }
            }
        }
    }
}

/// One event's worth of work
struct Worker {
    registry: Arc<HandlerRegistry>,
    monitor: Monitor,
}

impl Worker {
    async fn run(self, event: LifecycleEvent, slot: WorkerSlot) {
        // `slot` is held for lookup and every handler
        let handlers = self.registry.handlers_for(&event.status);
        if handlers.is_empty() {
            trace!(event_id = %event.short_id(), status = %event.status, "No handlers for status");
            return;
        }

        info!(event_id = %event.short_id(), status = %event.status, "Processing event");

        for handler in handlers {
            let outcome = match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        event_id = %event.id,
                        status = %event.status,
                        handler = handler.name(),
                        panic = %message,
                        "Handler panicked"
                    );
                    self.monitor.emit(RouterEvent::HandlerFailed {
                        event_id: event.id.clone(),
                        status: event.status.clone(),
                        handler: handler.name(),
                        error: format!("handler panicked: {}", message),
                    });
                    continue;
                }
            };

            match outcome {
                Ok(HandlerOutcome::Applied) => {
                    debug!(event_id = %event.short_id(), handler = handler.name(), "Handler applied");
                }
                Ok(HandlerOutcome::Skipped(reason)) => {
                    debug!(event_id = %event.short_id(), handler = handler.name(), %reason, "Handler skipped");
                }
                Err(e) if e.is_fatal() => {
                    error!(
                        event_id = %event.id,
                        status = %event.status,
                        handler = handler.name(),
                        error = %e,
                        "Unrecoverable error processing event"
                    );
                    self.monitor
                        .escalate(RouterEvent::Fatal {
                            event_id: event.id.clone(),
                            status: event.status.clone(),
                            handler: handler.name(),
                            error: e.to_string(),
                        })
                        .await;
                }
                Err(e) => {
                    error!(
                        event_id = %event.id,
                        status = %event.status,
                        handler = handler.name(),
                        error = %e,
                        "Error processing event"
                    );
                    self.monitor.emit(RouterEvent::HandlerFailed {
                        event_id: event.id.clone(),
                        status: event.status.clone(),
                        handler: handler.name(),
                        error: e.to_string(),
                    });
                }
            }
        }
        drop(slot);

        self.monitor.emit(RouterEvent::Completed {
            event_id: event.id.clone(),
            status: event.status.clone(),
            handlers: handlers.len(),
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
