//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal test doubles that verify architectural
//! constraints without talking to a container runtime or a DNS API.

#![allow(dead_code)]

use ecssd_core::config::{RecordConfig, RetryConfig, RouterConfig};
use ecssd_core::error::{Error, Result};
use ecssd_core::handlers::{Handler, HandlerOutcome, ReconcileContext};
use ecssd_core::traits::{
    ContainerDetails, ContainerInspector, DnsProvider, EventSource, LifecycleEvent, PortBinding,
    RecordSet,
};
use ecssd_core::{MemoryDnsProvider, RouterEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Label carrying the service name in the default configuration
pub const SERVICE_LABEL: &str = "com.amazonaws.ecs.container-name";

/// An EventSource that emits events on demand
#[derive(Default)]
pub struct ControlledEventSource {
    listeners: Mutex<Vec<mpsc::Sender<LifecycleEvent>>>,
    add_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    refuse_listeners: AtomicBool,
}

impl ControlledEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose add_listener always fails
    pub fn refusing() -> Self {
        let source = Self::default();
        source.refuse_listeners.store(true, Ordering::SeqCst);
        source
    }

    /// Deliver an event to every registered listener
    ///
    /// Returns the number of listeners that accepted it.
    pub async fn emit(&self, event: LifecycleEvent) -> usize {
        let listeners: Vec<_> = self.listeners.lock().unwrap().clone();
        let mut delivered = 0;
        for listener in listeners {
            if listener.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn add_call_count(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn remove_call_count(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EventSource for ControlledEventSource {
    async fn add_listener(&self, listener: mpsc::Sender<LifecycleEvent>) -> Result<()> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_listeners.load(Ordering::SeqCst) {
            return Err(Error::runtime("event stream unavailable"));
        }
        self.listeners.lock().unwrap().push(listener);
        Ok(())
    }

    async fn remove_listener(&self, listener: &mpsc::Sender<LifecycleEvent>) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap()
            .retain(|registered| !registered.same_channel(listener));
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        "controlled"
    }
}

/// Inspector answering from a fixed set of containers
///
/// Unknown instances fail inspection.
#[derive(Default)]
pub struct StaticInspector {
    containers: HashMap<String, ContainerDetails>,
}

impl StaticInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, details: ContainerDetails) -> Self {
        self.containers.insert(details.id.clone(), details);
        self
    }
}

#[async_trait::async_trait]
impl ContainerInspector for StaticInspector {
    async fn inspect(&self, instance_id: &str) -> Result<ContainerDetails> {
        self.containers
            .get(instance_id)
            .cloned()
            .ok_or_else(|| Error::runtime(format!("No such container: {instance_id}")))
    }
}

/// A labelled container publishing container port 80 on all interfaces
pub fn service_container(id: &str, service: &str, host_port: u16) -> ContainerDetails {
    ContainerDetails::new(id)
        .with_label(SERVICE_LABEL, service)
        .with_binding("80/tcp", PortBinding::new("0.0.0.0", host_port.to_string()))
}

/// A labelled container publishing nothing
pub fn unpublished_container(id: &str, service: &str) -> ContainerDetails {
    ContainerDetails::new(id).with_label(SERVICE_LABEL, service)
}

/// A DnsProvider that fails a configurable number of mutations before
/// delegating to an in-memory provider
pub struct FlakyDnsProvider {
    inner: MemoryDnsProvider,
    create_failures_left: AtomicUsize,
    delete_failures_left: AtomicUsize,
    create_attempts: AtomicUsize,
    delete_attempts: AtomicUsize,
}

impl FlakyDnsProvider {
    /// Fail the first `create_failures` creates and `delete_failures` deletes
    pub fn new(create_failures: usize, delete_failures: usize) -> Self {
        Self {
            inner: MemoryDnsProvider::new(),
            create_failures_left: AtomicUsize::new(create_failures),
            delete_failures_left: AtomicUsize::new(delete_failures),
            create_attempts: AtomicUsize::new(0),
            delete_attempts: AtomicUsize::new(0),
        }
    }

    /// Fail the first `failures` mutations of each kind
    pub fn failing_first(failures: usize) -> Self {
        Self::new(failures, failures)
    }

    /// Fail every mutation
    pub fn always_failing() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }

    /// Accept creates, fail every delete
    pub fn failing_deletes() -> Self {
        Self::new(0, usize::MAX)
    }

    pub fn records(&self) -> &MemoryDnsProvider {
        &self.inner
    }

    pub fn create_attempts(&self) -> usize {
        self.create_attempts.load(Ordering::SeqCst)
    }

    pub fn delete_attempts(&self) -> usize {
        self.delete_attempts.load(Ordering::SeqCst)
    }
}

fn take_failure(failures_left: &AtomicUsize) -> bool {
    failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait::async_trait]
impl DnsProvider for FlakyDnsProvider {
    async fn create_record(&self, record: &RecordSet) -> Result<()> {
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.create_failures_left) {
            return Err(Error::provider("flaky", "Throttling: rate exceeded"));
        }
        self.inner.create_record(record).await
    }

    async fn list_records(&self, name: &str, start_identifier: &str) -> Result<Vec<RecordSet>> {
        self.inner.list_records(name, start_identifier).await
    }

    async fn delete_record(&self, record: &RecordSet) -> Result<()> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.delete_failures_left) {
            return Err(Error::provider("flaky", "Throttling: rate exceeded"));
        }
        self.inner.delete_record(record).await
    }

    fn provider_name(&self) -> &'static str {
        "flaky"
    }
}

/// What a [`RecordingHandler`] does once it has been called
#[derive(Debug, Clone, Copy)]
pub enum HandlerBehavior {
    Succeed,
    Fail,
    FailFatally,
    Panic,
}

/// A handler that records calls and the number of concurrent invocations
pub struct RecordingHandler {
    name: &'static str,
    behavior: HandlerBehavior,
    work: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingHandler {
    pub fn new(name: &'static str, behavior: HandlerBehavior) -> Arc<Self> {
        Self::with_work(name, behavior, Duration::ZERO)
    }

    /// A handler that sleeps for `work` before finishing
    pub fn with_work(name: &'static str, behavior: HandlerBehavior, work: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            work,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Handler for RecordingHandler {
    async fn handle(&self, _event: &LifecycleEvent) -> Result<HandlerOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.behavior {
            HandlerBehavior::Succeed => Ok(HandlerOutcome::Applied),
            HandlerBehavior::Fail => Err(Error::dns_provider("InvalidChangeBatch")),
            HandlerBehavior::FailFatally => Err(Error::inspection("instance", "daemon went away")),
            HandlerBehavior::Panic => panic!("handler panicked on purpose"),
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Router configuration with the given pool size and worker timeout
pub fn router_config(worker_pool_size: usize, worker_timeout_secs: u64) -> RouterConfig {
    RouterConfig {
        event_buffer_size: 5,
        worker_pool_size,
        worker_timeout_secs,
        ..RouterConfig::default()
    }
}

/// Reconciliation context with the default record settings
pub fn reconcile_context(
    inspector: impl ContainerInspector + 'static,
    provider: Arc<dyn DnsProvider>,
) -> Arc<ReconcileContext> {
    let records = RecordConfig {
        host_name: "ip-10-0-0-12".to_string(),
        ..RecordConfig::default()
    };
    Arc::new(ReconcileContext::new(
        Arc::new(inspector),
        provider,
        records,
        RetryConfig::default(),
    ))
}

/// Receive router events until one matches, returning everything seen
///
/// Panics if no match arrives within ten minutes (of paused or real time).
pub async fn collect_until<F>(rx: &mut mpsc::Receiver<RouterEvent>, mut matches: F) -> Vec<RouterEvent>
where
    F: FnMut(&RouterEvent) -> bool,
{
    let mut seen = Vec::new();
    let deadline = tokio::time::sleep(Duration::from_secs(600));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            event = rx.recv() => {
                let event = event.expect("router event channel closed");
                let done = matches(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
            _ = &mut deadline => panic!("timed out waiting for router event; saw {seen:?}"),
        }
    }
}

/// Receive router events until `count` events have completed
pub async fn collect_completions(rx: &mut mpsc::Receiver<RouterEvent>, count: usize) -> Vec<RouterEvent> {
    let mut completed = 0;
    collect_until(rx, |event| {
        if matches!(event, RouterEvent::Completed { .. }) {
            completed += 1;
        }
        completed == count
    })
    .await
}

/// Start event for an instance
pub fn start(id: &str) -> LifecycleEvent {
    LifecycleEvent::new(id, "start")
}

/// Die event for an instance
pub fn die(id: &str) -> LifecycleEvent {
    LifecycleEvent::new(id, "die")
}
