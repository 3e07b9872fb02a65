use super::ReconcileContext;
use crate::config::{RecordConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::traits::{ContainerDetails, ContainerInspector, DnsProvider, PortBinding};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Inspector answering from a fixed set of containers
pub(crate) struct StaticInspector {
    containers: HashMap<String, ContainerDetails>,
}

#[async_trait]
impl ContainerInspector for StaticInspector {
    async fn inspect(&self, instance_id: &str) -> Result<ContainerDetails> {
        self.containers
            .get(instance_id)
            .cloned()
            .ok_or_else(|| Error::inspection(instance_id, "no such container"))
    }
}

pub(crate) fn web_container(id: &str, port: u16) -> ContainerDetails {
    ContainerDetails::new(id)
        .with_label("com.amazonaws.ecs.container-name", "web")
        .with_binding("80/tcp", PortBinding::new("0.0.0.0", port.to_string()))
}

pub(crate) fn context(
    containers: Vec<ContainerDetails>,
    provider: Arc<dyn DnsProvider>,
) -> Arc<ReconcileContext> {
    let records = RecordConfig {
        host_name: "ip-10-0-0-12".to_string(),
        ..RecordConfig::default()
    };
    context_with_records(containers, provider, records)
}

pub(crate) fn context_with_records(
    containers: Vec<ContainerDetails>,
    provider: Arc<dyn DnsProvider>,
    records: RecordConfig,
) -> Arc<ReconcileContext> {
    let inspector = StaticInspector {
        containers: containers.into_iter().map(|c| (c.id.clone(), c)).collect(),
    };
    Arc::new(ReconcileContext::new(
        Arc::new(inspector),
        provider,
        records,
        RetryConfig::default(),
    ))
}
