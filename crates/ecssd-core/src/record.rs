//! Service records
//!
//! A [`ServiceRecord`] is the logical DNS entity the agent reconciles: one
//! discoverable instance of a named service. The agent only issues mutation
//! intents for it; the provider owns the authoritative state.

use crate::config::RecordConfig;
use crate::traits::{RecordSet, RecordType};

/// One discoverable instance of a named service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Service name (from the container's service label)
    pub service_name: String,
    /// Instance identifier, used as the set identifier
    pub instance_id: String,
    /// Fully qualified target host, without trailing dot
    pub target_host: String,
    /// Published host port
    pub port: u16,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// SRV priority
    pub priority: u16,
    /// SRV and weighted-routing weight
    pub weight: u32,
}

impl ServiceRecord {
    /// Build a record for `service_name`/`instance_id` using the configured
    /// target host, TTL, priority and weight
    pub fn from_config(
        config: &RecordConfig,
        service_name: impl Into<String>,
        instance_id: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            instance_id: instance_id.into(),
            target_host: config.target_host(),
            port,
            ttl: config.ttl,
            priority: config.priority,
            weight: config.weight,
        }
    }

    /// SRV record value: "priority weight port target."
    pub fn srv_value(&self) -> String {
        format!(
            "{} {} {} {}.",
            self.priority,
            self.weight,
            self.port,
            self.target_host.trim_end_matches('.')
        )
    }

    /// Provider-side record set, named per `config`
    pub fn to_record_set(&self, config: &RecordConfig) -> RecordSet {
        RecordSet {
            name: config.record_name(&self.service_name),
            record_type: RecordType::Srv,
            value: self.srv_value(),
            set_identifier: self.instance_id.clone(),
            ttl: self.ttl,
            weight: self.weight,
            id: None,
        }
    }
}

/// Fully qualified record name of a service
pub fn record_name(service_name: &str, domain_suffix: &str, srv_protocol: Option<&str>) -> String {
    let domain = domain_suffix.trim_matches('.');
    match srv_protocol {
        Some(protocol) => format!("_{}._{}.{}", service_name, protocol, domain),
        None => format!("{}.{}", service_name, domain),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RecordConfig {
        RecordConfig {
            host_name: "ip-10-0-0-12".to_string(),
            ..RecordConfig::default()
        }
    }

    #[test]
    fn srv_value_matches_wire_format() {
        let record = ServiceRecord::from_config(&config(), "web", "abc123", 32768);
        assert_eq!(record.srv_value(), "1 1 32768 ip-10-0-0-12.compute.internal.");
    }

    #[test]
    fn record_set_is_keyed_by_instance() {
        let record = ServiceRecord::from_config(&config(), "web", "abc123", 32768);
        let set = record.to_record_set(&config());

        assert_eq!(set.name, "web.servicediscovery.internal");
        assert_eq!(set.set_identifier, "abc123");
        assert_eq!(set.record_type, RecordType::Srv);
        assert_eq!(set.ttl, 0);
        assert_eq!(set.weight, 1);
        assert_eq!(set.key(), "web.servicediscovery.internal/abc123");
    }

    #[test]
    fn record_name_tolerates_dotted_suffix() {
        assert_eq!(record_name("api", ".svc.local.", None), "api.svc.local");
        assert_eq!(record_name("api", ".svc.local.", Some("udp")), "_api._udp.svc.local");
    }
}
