use super::{Handler, HandlerOutcome, ReconcileContext, SkipReason};
use crate::error::Result;
use crate::record::ServiceRecord;
use crate::retry::retry_mutation;
use crate::traits::LifecycleEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Creates the SRV record of a started instance
///
/// Instances without an externally published port, or without a service
/// name label, are not discoverable and are skipped.
pub struct RegisterService {
    context: Arc<ReconcileContext>,
}

impl RegisterService {
    pub fn new(context: Arc<ReconcileContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Handler for RegisterService {
    async fn handle(&self, event: &LifecycleEvent) -> Result<HandlerOutcome> {
        let ctx = &self.context;
        let details = ctx.inspect(&event.id).await?;

        let Some(service_name) = details.service_name(&ctx.records.service_label) else {
            info!(event_id = %event.short_id(), label = %ctx.records.service_label, "Container has no service label, not registering");
            return Ok(HandlerOutcome::Skipped(SkipReason::NoServiceLabel));
        };

        let Some(port) = details.published_port() else {
            debug!(event_id = %event.short_id(), service = service_name, "No published port, not registering");
            return Ok(HandlerOutcome::Skipped(SkipReason::NoPublishedPort));
        };

        let record = ServiceRecord::from_config(&ctx.records, service_name, &event.id, port)
            .to_record_set(&ctx.records);
        let key = record.key();

        let provider = ctx.provider.as_ref();
        let record_ref = &record;
        retry_mutation(&ctx.retry, "create", &key, move || {
            provider.create_record(record_ref)
        })
        .await?;

        info!(
            event_id = %event.short_id(),
            record = %record.name,
            value = %record.value,
            provider = provider.provider_name(),
            "Record created"
        );
        Ok(HandlerOutcome::Applied)
    }

    fn name(&self) -> &'static str {
        "register"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordConfig;
    use crate::handlers::test_support::{context, context_with_records, web_container};
    use crate::provider::MemoryDnsProvider;
    use crate::traits::{ContainerDetails, DnsProvider, PortBinding};

    #[tokio::test]
    async fn creates_srv_record_for_published_port() {
        let provider = Arc::new(MemoryDnsProvider::new());
        let handler = RegisterService::new(context(vec![web_container("abc", 32768)], provider.clone()));

        let outcome = handler.handle(&LifecycleEvent::new("abc", "start")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Applied);

        let records = provider
            .list_records("web.servicediscovery.internal", "abc")
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, "1 1 32768 ip-10-0-0-12.compute.internal.");
        assert_eq!(records[0].set_identifier, "abc");
    }

    #[tokio::test]
    async fn srv_protocol_names_record_per_rfc_2782() {
        let provider = Arc::new(MemoryDnsProvider::new());
        let records = RecordConfig {
            host_name: "ip-10-0-0-12".to_string(),
            srv_protocol: Some("tcp".to_string()),
            ..RecordConfig::default()
        };
        let handler = RegisterService::new(context_with_records(
            vec![web_container("abc", 32768)],
            provider.clone(),
            records,
        ));

        handler.handle(&LifecycleEvent::new("abc", "start")).await.unwrap();

        let named = provider
            .list_records("_web._tcp.servicediscovery.internal", "abc")
            .await
            .unwrap();
        assert_eq!(named.len(), 1);
        assert!(
            provider
                .list_records("web.servicediscovery.internal", "abc")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn unpublished_port_is_a_noop() {
        let provider = Arc::new(MemoryDnsProvider::new());
        let container = ContainerDetails::new("abc")
            .with_label("com.amazonaws.ecs.container-name", "web")
            .with_binding("80/tcp", PortBinding::new("127.0.0.1", "8080"));
        let handler = RegisterService::new(context(vec![container], provider.clone()));

        let outcome = handler.handle(&LifecycleEvent::new("abc", "start")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Skipped(SkipReason::NoPublishedPort));
        assert_eq!(provider.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn missing_label_is_a_noop() {
        let provider = Arc::new(MemoryDnsProvider::new());
        let container = ContainerDetails::new("abc")
            .with_binding("80/tcp", PortBinding::new("0.0.0.0", "8080"));
        let handler = RegisterService::new(context(vec![container], provider.clone()));

        let outcome = handler.handle(&LifecycleEvent::new("abc", "start")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Skipped(SkipReason::NoServiceLabel));
        assert!(provider.is_empty().await);
    }

    #[tokio::test]
    async fn inspection_failure_is_fatal() {
        let provider = Arc::new(MemoryDnsProvider::new());
        let handler = RegisterService::new(context(Vec::new(), provider));

        let err = handler
            .handle(&LifecycleEvent::new("missing", "start"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
