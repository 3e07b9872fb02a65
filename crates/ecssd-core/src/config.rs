//! Configuration types for the ecssd agent
//!
//! This module defines all configuration structures used throughout the crate.
//! Every default reproduces the agent's observed production behavior.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Event router settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Backoff policy for DNS mutations
    #[serde(default)]
    pub retry: RetryConfig,

    /// How service records are rendered
    #[serde(default)]
    pub records: RecordConfig,

    /// DNS provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Container runtime configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl AgentConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.router.validate()?;
        self.retry.validate()?;
        self.records.validate()?;
        self.provider.validate()?;
        self.runtime.validate()?;
        Ok(())
    }
}

/// Event router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Capacity of the inbound event channel
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Number of worker slots (maximum concurrent reconciliations)
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// How long the dispatch loop waits for a free worker before logging
    /// and waiting again (in seconds)
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,

    /// Capacity of the router's monitoring event channel
    ///
    /// When full, informational events are dropped (with a warning log).
    #[serde(default = "default_monitor_channel_capacity")]
    pub monitor_channel_capacity: usize,
}

impl RouterConfig {
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_buffer_size == 0 {
            return Err(crate::Error::config("Event buffer size must be > 0"));
        }
        if self.worker_pool_size == 0 {
            return Err(crate::Error::config("Worker pool size must be > 0"));
        }
        if self.worker_timeout_secs == 0 {
            return Err(crate::Error::config("Worker timeout must be > 0"));
        }
        if self.monitor_channel_capacity == 0 {
            return Err(crate::Error::config("Monitor channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            worker_pool_size: default_worker_pool_size(),
            worker_timeout_secs: default_worker_timeout_secs(),
            monitor_channel_capacity: default_monitor_channel_capacity(),
        }
    }
}

/// Backoff policy for DNS mutations
///
/// The wait before the k-th retry starts at `initial_backoff_secs` and grows
/// by `backoff_step_secs`. Once the next wait would exceed
/// `fatal_threshold_secs`, the failure is fatal. Defaults give waits of
/// 1, 3, 5 and 7 seconds followed by a fatal fifth failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_backoff_step_secs")]
    pub backoff_step_secs: u64,

    #[serde(default = "default_fatal_threshold_secs")]
    pub fatal_threshold_secs: u64,
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.backoff_step_secs == 0 && self.initial_backoff_secs <= self.fatal_threshold_secs {
            return Err(crate::Error::config(
                "Backoff step must be > 0, otherwise a failing mutation retries forever",
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: default_initial_backoff_secs(),
            backoff_step_secs: default_backoff_step_secs(),
            fatal_threshold_secs: default_fatal_threshold_secs(),
        }
    }
}

/// Service record rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Zone suffix appended to service names
    #[serde(default = "default_domain_suffix")]
    pub domain_suffix: String,

    /// Short name of this host (SRV target)
    #[serde(default)]
    pub host_name: String,

    /// Suffix appended to `host_name` to form the SRV target
    #[serde(default = "default_host_suffix")]
    pub host_suffix: String,

    /// Container label holding the service name
    #[serde(default = "default_service_label")]
    pub service_label: String,

    /// SRV protocol label ("tcp", "udp")
    ///
    /// When set, records are named `_<service>._<protocol>.<domain_suffix>`
    /// as RFC 2782 requires; otherwise `<service>.<domain_suffix>`.
    #[serde(default)]
    pub srv_protocol: Option<String>,

    /// Record time-to-live (seconds)
    #[serde(default)]
    pub ttl: u32,

    /// SRV priority
    #[serde(default = "default_priority")]
    pub priority: u16,

    /// SRV and weighted-routing weight
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl RecordConfig {
    /// Fully qualified SRV target, without trailing dot
    pub fn target_host(&self) -> String {
        let suffix = self.host_suffix.trim_matches('.');
        if suffix.is_empty() {
            self.host_name.clone()
        } else {
            format!("{}.{}", self.host_name, suffix)
        }
    }

    /// Fully qualified record name of a service
    pub fn record_name(&self, service_name: &str) -> String {
        crate::record::record_name(service_name, &self.domain_suffix, self.srv_protocol.as_deref())
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if let Some(protocol) = &self.srv_protocol {
            if protocol.is_empty() || !protocol.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(crate::Error::config(format!("Invalid SRV protocol '{}'", protocol)));
            }
        }
        if self.domain_suffix.trim_matches('.').is_empty() {
            return Err(crate::Error::config("Domain suffix cannot be empty"));
        }
        if self.host_name.is_empty() {
            return Err(crate::Error::config("Host name cannot be empty"));
        }
        if self.service_label.is_empty() {
            return Err(crate::Error::config("Service label cannot be empty"));
        }
        Ok(())
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            domain_suffix: default_domain_suffix(),
            host_name: String::new(),
            host_suffix: default_host_suffix(),
            service_label: default_service_label(),
            srv_protocol: None,
            ttl: 0,
            priority: default_priority(),
            weight: default_weight(),
        }
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// In-memory provider (not persistent, for dry runs and tests)
    #[default]
    Memory,

    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Zone ID holding the service records
        zone_id: String,
        /// Perform reads but skip mutations
        #[serde(default)]
        dry_run: bool,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Memory => Ok(()),
            ProviderConfig::Cloudflare {
                api_token, zone_id, ..
            } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if zone_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare zone ID cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Memory => "memory",
            ProviderConfig::Cloudflare { .. } => "cloudflare",
        }
    }
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime endpoint ("unix:///var/run/docker.sock" or "tcp://host:2375")
    #[serde(default = "default_docker_host")]
    pub docker_host: String,

    /// Delay before re-subscribing after the event stream ends (seconds)
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        let supported = ["unix://", "tcp://", "http://", "https://"];
        if !supported.iter().any(|scheme| self.docker_host.starts_with(scheme)) {
            return Err(crate::Error::config(format!(
                "Unsupported runtime endpoint '{}'. Supported schemes: unix, tcp, http, https",
                self.docker_host
            )));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_host: default_docker_host(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

fn default_event_buffer_size() -> usize {
    5
}

fn default_worker_pool_size() -> usize {
    5
}

fn default_worker_timeout_secs() -> u64 {
    60
}

fn default_monitor_channel_capacity() -> usize {
    1000
}

fn default_initial_backoff_secs() -> u64 {
    1
}

fn default_backoff_step_secs() -> u64 {
    2
}

fn default_fatal_threshold_secs() -> u64 {
    8
}

fn default_domain_suffix() -> String {
    "servicediscovery.internal".to_string()
}

fn default_host_suffix() -> String {
    "compute.internal".to_string()
}

fn default_service_label() -> String {
    "com.amazonaws.ecs.container-name".to_string()
}

fn default_priority() -> u16 {
    1
}

fn default_weight() -> u32 {
    1
}

fn default_docker_host() -> String {
    "unix:///var/run/docker.sock".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_agent() {
        let config = AgentConfig::default();
        assert_eq!(config.router.event_buffer_size, 5);
        assert_eq!(config.router.worker_pool_size, 5);
        assert_eq!(config.router.worker_timeout(), Duration::from_secs(60));
        assert_eq!(config.retry.initial_backoff_secs, 1);
        assert_eq!(config.retry.backoff_step_secs, 2);
        assert_eq!(config.retry.fatal_threshold_secs, 8);
        assert_eq!(config.records.ttl, 0);
        assert_eq!(config.records.weight, 1);
        assert_eq!(config.runtime.docker_host, "unix:///var/run/docker.sock");
    }

    #[test]
    fn deserializes_partial_config() {
        let config: AgentConfig = serde_json::from_value(serde_json::json!({
            "router": { "worker_pool_size": 2 },
            "records": { "host_name": "ip-10-0-0-1" },
            "provider": { "type": "cloudflare", "api_token": "t", "zone_id": "z" }
        }))
        .unwrap();

        assert_eq!(config.router.worker_pool_size, 2);
        assert_eq!(config.router.event_buffer_size, 5);
        assert_eq!(config.provider.type_name(), "cloudflare");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_pool_size() {
        let mut config = AgentConfig::default();
        config.records.host_name = "host".to_string();
        config.router.worker_pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_growing_backoff() {
        let retry = RetryConfig {
            initial_backoff_secs: 1,
            backoff_step_secs: 0,
            fatal_threshold_secs: 8,
        };
        assert!(retry.validate().is_err());
    }

    #[test]
    fn target_host_joins_suffix() {
        let records = RecordConfig {
            host_name: "ip-10-0-0-1".to_string(),
            ..RecordConfig::default()
        };
        assert_eq!(records.target_host(), "ip-10-0-0-1.compute.internal");

        let bare = RecordConfig {
            host_name: "node1".to_string(),
            host_suffix: String::new(),
            ..RecordConfig::default()
        };
        assert_eq!(bare.target_host(), "node1");
    }

    #[test]
    fn srv_protocol_shapes_record_name() {
        let plain = RecordConfig::default();
        assert_eq!(plain.record_name("web"), "web.servicediscovery.internal");

        let rfc = RecordConfig {
            srv_protocol: Some("tcp".to_string()),
            host_name: "node1".to_string(),
            ..RecordConfig::default()
        };
        assert_eq!(rfc.record_name("web"), "_web._tcp.servicediscovery.internal");
        assert!(rfc.validate().is_ok());

        let invalid = RecordConfig {
            srv_protocol: Some("_tcp.".to_string()),
            host_name: "node1".to_string(),
            ..RecordConfig::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn rejects_unknown_runtime_scheme() {
        let runtime = RuntimeConfig {
            docker_host: "npipe:////./pipe/docker_engine".to_string(),
            ..RuntimeConfig::default()
        };
        assert!(runtime.validate().is_err());
    }
}
