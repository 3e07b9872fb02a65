// # Event Source Trait
//
// Defines the interface of the container runtime's event transport.
//
// ## Implementations
//
// - Docker Engine API: `ecssd-runtime-docker` crate
//
// ## Usage
//
// ```rust,ignore
// use ecssd_core::EventSource;
//
// let (tx, mut rx) = tokio::sync::mpsc::channel(16);
// source.add_listener(tx.clone()).await?;
// while let Some(event) = rx.recv().await {
//     println!("{} {}", event.status, event.id);
// }
// source.remove_listener(&tx).await?;
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// A container lifecycle notification read from the runtime event stream
///
/// Events are immutable and are consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Unique instance (container) identifier
    pub id: String,
    /// Status string in the runtime's vocabulary ("start", "die", ...)
    pub status: String,
    /// Runtime-provided attributes (image, name, labels)
    pub attributes: HashMap<String, String>,
    /// When the runtime emitted the event, if known
    pub time: Option<DateTime<Utc>>,
}

impl LifecycleEvent {
    /// Create a new event without attributes
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            attributes: HashMap::new(),
            time: None,
        }
    }

    /// Shortened identifier for log lines
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

/// Trait for runtime event transports
///
/// Listeners are plain channel senders. A transport fans every event out to
/// all registered listeners until they are removed.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Register a listener channel
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The listener will receive subsequent events
    /// - `Err(Error)`: Subscription failed; callers treat this as a startup error
    async fn add_listener(&self, listener: mpsc::Sender<LifecycleEvent>) -> Result<(), crate::Error>;

    /// Deregister a listener previously passed to [`EventSource::add_listener`]
    ///
    /// Listeners are matched by channel identity. Removing an unknown
    /// listener is not an error.
    async fn remove_listener(&self, listener: &mpsc::Sender<LifecycleEvent>) -> Result<(), crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
