// # ecssd-core
//
// Event dispatch and reconciliation core of the ecssd service-discovery agent.
//
// ## Architecture Overview
//
// The agent keeps a DNS record set in step with the containers running on a
// host:
// - **EventSource**: Trait for subscribing to container lifecycle events
// - **ContainerInspector**: Trait for resolving service labels and published ports
// - **DnsProvider**: Trait for creating, listing and deleting DNS record sets
// - **EventRouter**: Bounded-concurrency dispatcher of events to workers
// - **HandlerRegistry**: Status-keyed table of reconciliation actions
// - **retry**: Backoff state machine wrapped around every DNS mutation
// - **ProviderRegistry**: Plugin-based registry for DNS providers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from runtime and provider adapters
// 2. **Event-Driven**: No periodic resync; DNS follows the live event stream
// 3. **Bounded Concurrency**: A fixed worker pool caps in-flight reconciliations
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Escalation by the Caller**: The core reports fatal errors, the daemon exits

pub mod traits;
pub mod router;
pub mod handlers;
pub mod retry;
pub mod record;
pub mod registry;
pub mod config;
pub mod error;
pub mod provider;

// Re-export core types for convenience
pub use traits::{ContainerInspector, DnsProvider, EventSource, LifecycleEvent, RecordSet};
pub use router::{EventRouter, RouterEvent, WorkerPool};
pub use handlers::{Handler, HandlerOutcome, HandlerRegistry, ReconcileContext};
pub use record::ServiceRecord;
pub use registry::ProviderRegistry;
pub use config::{AgentConfig, ProviderConfig, RecordConfig, RetryConfig, RouterConfig, RuntimeConfig};
pub use error::{Error, Result};
pub use provider::MemoryDnsProvider;
