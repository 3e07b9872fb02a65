//! Reconciliation actions and the status-keyed handler registry
//!
//! A [`Handler`] turns one [`LifecycleEvent`] into DNS mutations. The set of
//! handlers is closed: [`RegisterService`] for start-type events and
//! [`DeregisterService`] for die-type events. Both share one
//! [`ReconcileContext`] holding the injected collaborators.
//!
//! The [`HandlerRegistry`] maps an event status to an ordered list of
//! handlers. It is built once at startup and never mutated afterwards, so
//! workers read it without locking.

mod deregister;
mod register;
#[cfg(test)]
pub(crate) mod test_support;

pub use deregister::DeregisterService;
pub use register::RegisterService;

use crate::config::{RecordConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::traits::{ContainerDetails, ContainerInspector, DnsProvider, LifecycleEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Status emitted by the runtime when a container starts
pub const STATUS_START: &str = "start";

/// Status emitted by the runtime when a container exits
pub const STATUS_DIE: &str = "die";

/// Result of a handler that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// DNS state was mutated
    Applied,
    /// Nothing to do; not an error
    Skipped(SkipReason),
}

/// Why a handler had nothing to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The instance publishes no port on all interfaces
    NoPublishedPort,
    /// The instance carries no service name label
    NoServiceLabel,
    /// The record to delete is already absent
    RecordAbsent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NoPublishedPort => "no externally published port",
            SkipReason::NoServiceLabel => "no service name label",
            SkipReason::RecordAbsent => "record already absent",
        };
        f.write_str(reason)
    }
}

/// A reconciliation action
///
/// # Errors
///
/// Errors are reported by the worker and never reach the router. Errors for
/// which [`Error::is_fatal`] holds are escalated to the process owner.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Reconcile DNS state for one event
    async fn handle(&self, event: &LifecycleEvent) -> Result<HandlerOutcome>;

    /// Handler name (for logging)
    fn name(&self) -> &'static str;
}

/// Collaborators and settings shared by the reconciliation actions
pub struct ReconcileContext {
    /// Container inspection API
    pub inspector: Arc<dyn ContainerInspector>,
    /// DNS provider API
    pub provider: Arc<dyn DnsProvider>,
    /// Record rendering settings
    pub records: RecordConfig,
    /// Backoff policy for mutations
    pub retry: RetryConfig,
}

impl ReconcileContext {
    pub fn new(
        inspector: Arc<dyn ContainerInspector>,
        provider: Arc<dyn DnsProvider>,
        records: RecordConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            inspector,
            provider,
            records,
            retry,
        }
    }

    /// Inspect an instance; any failure is reported as an inspection error
    pub(crate) async fn inspect(&self, instance_id: &str) -> Result<ContainerDetails> {
        self.inspector
            .inspect(instance_id)
            .await
            .map_err(|e| match e {
                Error::Inspection { .. } => e,
                other => Error::inspection(instance_id, other.to_string()),
            })
    }
}

/// Status-keyed registry of reconciliation actions
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The agent's registry: "start" registers, "die" deregisters
    pub fn standard(context: Arc<ReconcileContext>) -> Self {
        Self::new()
            .with_handler(STATUS_START, RegisterService::new(Arc::clone(&context)))
            .with_handler(STATUS_DIE, DeregisterService::new(context))
    }

    /// Append a handler for `status`
    ///
    /// Handlers for the same status run in the order they were added.
    pub fn with_handler(self, status: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.with_shared_handler(status, Arc::new(handler))
    }

    /// Append an already shared handler for `status`
    pub fn with_shared_handler(mut self, status: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.handlers.entry(status.into()).or_default().push(handler);
        self
    }

    /// Handlers registered for `status`, in registration order
    ///
    /// Unknown statuses yield an empty slice.
    pub fn handlers_for(&self, status: &str) -> &[Arc<dyn Handler>] {
        self.handlers.get(status).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Registered statuses
    pub fn statuses(&self) -> Vec<String> {
        let mut statuses: Vec<String> = self.handlers.keys().cloned().collect();
        statuses.sort();
        statuses
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for status in self.statuses() {
            let names: Vec<&str> = self.handlers_for(&status).iter().map(|h| h.name()).collect();
            map.entry(&status, &names);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Handler for Named {
        async fn handle(&self, _event: &LifecycleEvent) -> Result<HandlerOutcome> {
            Ok(HandlerOutcome::Applied)
        }

        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn handlers_keep_registration_order() {
        let registry = HandlerRegistry::new()
            .with_handler("start", Named("first"))
            .with_handler("die", Named("other"))
            .with_handler("start", Named("second"));

        let names: Vec<&str> = registry
            .handlers_for("start")
            .iter()
            .map(|h| h.name())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(registry.statuses(), vec!["die".to_string(), "start".to_string()]);
    }

    #[test]
    fn lookup_is_exact_match() {
        let registry = HandlerRegistry::new().with_handler("start", Named("first"));

        assert_eq!(registry.handlers_for("start").len(), 1);
        assert!(registry.handlers_for("Start").is_empty());
        assert!(registry.handlers_for("exec_start").is_empty());
        assert!(registry.handlers_for("pause").is_empty());
    }

    #[test]
    fn debug_lists_handler_names() {
        let registry = HandlerRegistry::new().with_handler("start", Named("register"));
        assert_eq!(format!("{registry:?}"), r#"{"start": ["register"]}"#);
    }
}
