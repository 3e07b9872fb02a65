// # Container Inspector Trait
//
// Resolves the metadata a reconciliation action needs to compute a DNS
// record: the service name label and the published host port.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

/// Host address that marks a binding as externally published
pub const ANY_HOST_IP: &str = "0.0.0.0";

/// A single host binding of a container port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Host interface address ("0.0.0.0" for all interfaces)
    pub host_ip: String,
    /// Host port, as reported by the runtime
    pub host_port: String,
}

impl PortBinding {
    pub fn new(host_ip: impl Into<String>, host_port: impl Into<String>) -> Self {
        Self {
            host_ip: host_ip.into(),
            host_port: host_port.into(),
        }
    }
}

/// Inspection result for one container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    /// Instance identifier
    pub id: String,
    /// Container labels
    pub labels: HashMap<String, String>,
    /// Container port (e.g. "80/tcp") to host bindings, ordered by key
    pub ports: BTreeMap<String, Vec<PortBinding>>,
}

impl ContainerDetails {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_binding(mut self, container_port: impl Into<String>, binding: PortBinding) -> Self {
        self.ports.entry(container_port.into()).or_default().push(binding);
        self
    }

    /// Service name carried by `label`, if present and non-empty
    pub fn service_name(&self, label: &str) -> Option<&str> {
        self.labels
            .get(label)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// First externally published host port
    ///
    /// Only the first binding of each container port is considered, and only
    /// bindings on all interfaces count as published.
    pub fn published_port(&self) -> Option<u16> {
        self.ports
            .values()
            .filter_map(|bindings| bindings.first())
            .find(|binding| binding.host_ip == ANY_HOST_IP)
            .and_then(|binding| binding.host_port.parse().ok())
    }
}

/// Trait for container inspection
///
/// # Thread Safety
///
/// Implementations must be thread-safe; one inspector is shared by every
/// worker.
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    /// Inspect a container by instance identifier
    ///
    /// # Returns
    ///
    /// - `Ok(ContainerDetails)`: Labels and port bindings
    /// - `Err(Error)`: The runtime could not describe the container
    async fn inspect(&self, instance_id: &str) -> Result<ContainerDetails, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_port_requires_any_interface_binding() {
        let details = ContainerDetails::new("abc")
            .with_binding("8080/tcp", PortBinding::new("127.0.0.1", "18080"))
            .with_binding("80/tcp", PortBinding::new("0.0.0.0", "32768"));
        assert_eq!(details.published_port(), Some(32768));

        let loopback_only = ContainerDetails::new("abc")
            .with_binding("80/tcp", PortBinding::new("127.0.0.1", "32768"));
        assert_eq!(loopback_only.published_port(), None);
    }

    #[test]
    fn published_port_ignores_unbound_ports() {
        let mut details = ContainerDetails::new("abc");
        details.ports.insert("53/udp".to_string(), Vec::new());
        assert_eq!(details.published_port(), None);
    }

    #[test]
    fn empty_service_label_is_absent() {
        let details = ContainerDetails::new("abc").with_label("svc", "");
        assert_eq!(details.service_name("svc"), None);
        assert_eq!(details.service_name("other"), None);

        let details = ContainerDetails::new("abc").with_label("svc", "web");
        assert_eq!(details.service_name("svc"), Some("web"));
    }
}
