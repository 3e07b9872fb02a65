use super::{Handler, HandlerOutcome, ReconcileContext, SkipReason};
use crate::error::Result;
use crate::retry::retry_mutation;
use crate::traits::{DnsProvider, LifecycleEvent, RecordSet};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Deletes the SRV record of an exited instance
///
/// Deletion is value-addressed, so the record is listed first to recover its
/// exact value. A record that is already gone counts as success.
pub struct DeregisterService {
    context: Arc<ReconcileContext>,
}

impl DeregisterService {
    pub fn new(context: Arc<ReconcileContext>) -> Self {
        Self { context }
    }
}

/// List the record set of (`name`, `instance_id`) and delete it if present
async fn delete_existing(
    provider: &dyn DnsProvider,
    name: &str,
    instance_id: &str,
) -> Result<Option<RecordSet>> {
    let listed = provider.list_records(name, instance_id).await?;
    let existing = listed.into_iter().find(|record| {
        record.set_identifier == instance_id
            && record.name.trim_end_matches('.') == name.trim_end_matches('.')
    });

    let Some(existing) = existing else {
        return Ok(None);
    };
    provider.delete_record(&existing).await?;
    Ok(Some(existing))
}

#[async_trait]
impl Handler for DeregisterService {
    async fn handle(&self, event: &LifecycleEvent) -> Result<HandlerOutcome> {
        let ctx = &self.context;
        let details = ctx.inspect(&event.id).await?;

        let Some(service_name) = details.service_name(&ctx.records.service_label) else {
            info!(event_id = %event.short_id(), label = %ctx.records.service_label, "Container has no service label, not deregistering");
            return Ok(HandlerOutcome::Skipped(SkipReason::NoServiceLabel));
        };

        let name = ctx.records.record_name(service_name);
        let key = format!("{}/{}", name, event.id);

        let provider = ctx.provider.as_ref();
        let (name_ref, id_ref) = (name.as_str(), event.id.as_str());
        let deleted = retry_mutation(&ctx.retry, "delete", &key, move || {
            delete_existing(provider, name_ref, id_ref)
        })
        .await?;

        match deleted {
            Some(record) => {
                info!(
                    event_id = %event.short_id(),
                    record = %record.name,
                    value = %record.value,
                    provider = provider.provider_name(),
                    "Record deleted"
                );
                Ok(HandlerOutcome::Applied)
            }
            None => {
                info!(event_id = %event.short_id(), record = %name, "Record doesn't exist, nothing to delete");
                Ok(HandlerOutcome::Skipped(SkipReason::RecordAbsent))
            }
        }
    }

    fn name(&self) -> &'static str {
        "deregister"
    }
}
