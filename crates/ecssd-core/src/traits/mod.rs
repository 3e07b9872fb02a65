//! Core traits for the ecssd agent
//!
//! This module defines the abstract interfaces of the agent's external
//! collaborators.
//!
//! - [`EventSource`]: Deliver container lifecycle events to listeners
//! - [`ContainerInspector`]: Resolve labels and published ports of an instance
//! - [`DnsProvider`]: Create, list and delete DNS record sets

pub mod event_source;
pub mod inspector;
pub mod dns_provider;

pub use event_source::{EventSource, LifecycleEvent};
pub use inspector::{ContainerDetails, ContainerInspector, PortBinding};
pub use dns_provider::{DnsProvider, DnsProviderFactory, RecordSet, RecordType};
