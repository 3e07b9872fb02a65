//! Architectural Contract Test: DNS Reconciliation
//!
//! This test drives the standard handler registry through the router and
//! checks the resulting DNS state.
//!
//! Constraints verified:
//! - A started, labelled container with a published port gets one SRV record
//! - A container that dies has its record deleted
//! - Containers without a published port or service label cause no mutation
//! - Deleting a record that is already gone is not an error
//! - An inspection failure is escalated as fatal
//!
//! If this test fails, the handlers no longer keep DNS in step with the
//! container lifecycle.

mod common;

use common::*;
use ecssd_core::handlers::HandlerRegistry;
use ecssd_core::{EventRouter, MemoryDnsProvider, RouterEvent};
use std::sync::Arc;

fn standard_router(
    source: Arc<ControlledEventSource>,
    inspector: StaticInspector,
    provider: Arc<MemoryDnsProvider>,
) -> (EventRouter, tokio::sync::mpsc::Receiver<RouterEvent>) {
    let registry = HandlerRegistry::standard(reconcile_context(inspector, provider));
    EventRouter::new(source, registry, &router_config(1, 60)).expect("router construction succeeds")
}

#[tokio::test]
async fn start_creates_srv_record() {
    let source = Arc::new(ControlledEventSource::new());
    let provider = Arc::new(MemoryDnsProvider::new());
    let inspector = StaticInspector::new().with(service_container("4f2a9c1e7b3d", "web", 32768));

    let (router, mut events) = standard_router(source.clone(), inspector, provider.clone());
    router.start().await.expect("router starts");

    source.emit(start("4f2a9c1e7b3d")).await;
    collect_completions(&mut events, 1).await;

    let records = provider.records().await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.name, "web.servicediscovery.internal");
    assert_eq!(record.set_identifier, "4f2a9c1e7b3d");
    assert_eq!(record.value, "1 1 32768 ip-10-0-0-12.compute.internal.");
    assert_eq!(record.ttl, 0);
    assert_eq!(record.weight, 1);
}

#[tokio::test]
async fn start_then_die_leaves_no_record() {
    let source = Arc::new(ControlledEventSource::new());
    let provider = Arc::new(MemoryDnsProvider::new());
    let inspector = StaticInspector::new().with(service_container("abc", "web", 32768));

    let (router, mut events) = standard_router(source.clone(), inspector, provider.clone());
    router.start().await.expect("router starts");

    source.emit(start("abc")).await;
    collect_completions(&mut events, 1).await;
    source.emit(die("abc")).await;
    collect_completions(&mut events, 1).await;

    assert!(provider.is_empty().await);
    assert_eq!(provider.create_count().await, 1);
    assert_eq!(provider.delete_count().await, 1);
}

#[tokio::test]
async fn die_only_removes_its_own_instance() {
    let source = Arc::new(ControlledEventSource::new());
    let provider = Arc::new(MemoryDnsProvider::new());
    let inspector = StaticInspector::new()
        .with(service_container("aaa", "web", 32768))
        .with(service_container("bbb", "web", 32769));

    let (router, mut events) = standard_router(source.clone(), inspector, provider.clone());
    router.start().await.expect("router starts");

    source.emit(start("aaa")).await;
    source.emit(start("bbb")).await;
    collect_completions(&mut events, 2).await;
    source.emit(die("aaa")).await;
    collect_completions(&mut events, 1).await;

    let remaining: Vec<String> = provider
        .records()
        .await
        .into_iter()
        .map(|r| r.set_identifier)
        .collect();
    assert_eq!(remaining, vec!["bbb".to_string()]);
}

#[tokio::test]
async fn unpublished_container_is_not_registered() {
    let source = Arc::new(ControlledEventSource::new());
    let provider = Arc::new(MemoryDnsProvider::new());
    let inspector = StaticInspector::new().with(unpublished_container("abc", "worker"));

    let (router, mut events) = standard_router(source.clone(), inspector, provider.clone());
    router.start().await.expect("router starts");

    source.emit(start("abc")).await;
    let seen = collect_completions(&mut events, 1).await;

    assert_eq!(provider.mutation_count().await, 0);
    assert!(!seen.iter().any(|e| matches!(e, RouterEvent::HandlerFailed { .. })));
}

#[tokio::test]
async fn unlabelled_container_is_not_registered() {
    let source = Arc::new(ControlledEventSource::new());
    let provider = Arc::new(MemoryDnsProvider::new());
    let unlabelled = ecssd_core::traits::ContainerDetails::new("abc").with_binding(
        "80/tcp",
        ecssd_core::traits::PortBinding::new("0.0.0.0", "32768"),
    );
    let inspector = StaticInspector::new().with(unlabelled);

    let (router, mut events) = standard_router(source.clone(), inspector, provider.clone());
    router.start().await.expect("router starts");

    source.emit(start("abc")).await;
    collect_completions(&mut events, 1).await;

    assert_eq!(provider.mutation_count().await, 0);
}

#[tokio::test]
async fn die_for_unknown_record_is_a_no_op() {
    let source = Arc::new(ControlledEventSource::new());
    let provider = Arc::new(MemoryDnsProvider::new());
    let inspector = StaticInspector::new().with(service_container("abc", "web", 32768));

    let (router, mut events) = standard_router(source.clone(), inspector, provider.clone());
    router.start().await.expect("router starts");

    source.emit(die("abc")).await;
    let seen = collect_completions(&mut events, 1).await;

    assert_eq!(provider.delete_count().await, 0);
    assert!(!seen.iter().any(|e| matches!(
        e,
        RouterEvent::HandlerFailed { .. } | RouterEvent::Fatal { .. }
    )));
}

#[tokio::test]
async fn inspection_failure_is_fatal() {
    let source = Arc::new(ControlledEventSource::new());
    let provider = Arc::new(MemoryDnsProvider::new());

    let (router, mut events) = standard_router(source.clone(), StaticInspector::new(), provider.clone());
    router.start().await.expect("router starts");

    source.emit(start("gone")).await;
    let seen = collect_until(&mut events, |e| matches!(e, RouterEvent::Fatal { .. })).await;

    match seen.last() {
        Some(RouterEvent::Fatal { event_id, handler, error, .. }) => {
            assert_eq!(event_id, "gone");
            assert_eq!(*handler, "register");
            assert!(error.contains("gone"), "error names the instance: {error}");
        }
        other => panic!("expected fatal event, got {other:?}"),
    }
    assert_eq!(provider.mutation_count().await, 0);
}
