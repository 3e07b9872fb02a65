// # DNS Provider Trait
//
// Defines the interface for mutating DNS record sets via provider APIs.
//
// ## Implementations
//
// - In-memory: `ecssd_core::provider::MemoryDnsProvider`
// - Cloudflare: `ecssd-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use ecssd_core::DnsProvider;
//
// provider.create_record(&record).await?;
// let existing = provider.list_records(&record.name, &record.set_identifier).await?;
// for record in existing {
//     provider.delete_record(&record).await?;
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// DNS record type managed by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// Service locator record ("priority weight port target")
    Srv,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Srv => "SRV",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider-side record set
///
/// The agent never caches these; they are built from a
/// [`ServiceRecord`](crate::record::ServiceRecord) for creation, or read back
/// from the provider for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Fully qualified record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Exact record value
    pub value: String,
    /// Discriminator between record sets sharing a name (the instance id)
    pub set_identifier: String,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Weighted-routing weight
    pub weight: u32,
    /// Provider-assigned record id, if the provider has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl RecordSet {
    /// "name/set_identifier", used in logs and errors
    pub fn key(&self) -> String {
        format!("{}/{}", self.name, self.set_identifier)
    }
}

/// Trait for DNS provider implementations
///
/// This trait defines the three calls the reconciliation actions need.
/// Implementations handle the specifics of each provider's API.
///
/// # Thread Safety
///
/// Implementations must be thread-safe. A single instance is shared by
/// every worker and may be called concurrently.
///
/// # No Retry Logic
///
/// Providers execute one API call per invocation and return failures as-is.
/// Retry, backoff and escalation belong to the
/// [`retry`](crate::retry) module; a provider that retried internally would
/// distort the backoff sequence and the fatal threshold.
///
/// # No Idempotency Guarantee
///
/// Providers are not required to be idempotent. Creating an existing record
/// set may fail, and deletion is value-addressed: it requires the exact
/// prior value, which is why deregistration lists before it deletes.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create a record set
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The record set was created
    /// - `Err(Error)`: The provider rejected or failed the request
    async fn create_record(&self, record: &RecordSet) -> Result<(), crate::Error>;

    /// List record sets starting at (`name`, `start_identifier`)
    ///
    /// The listing may include neighbouring record sets; callers must filter
    /// by name and set identifier themselves.
    async fn list_records(
        &self,
        name: &str,
        start_identifier: &str,
    ) -> Result<Vec<RecordSet>, crate::Error>;

    /// Delete a record set using its exact current value
    async fn delete_record(&self, record: &RecordSet) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    ///
    /// # Returns
    ///
    /// A static string identifying the provider (e.g., "cloudflare", "memory")
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this provider
    ///
    /// # Returns
    ///
    /// A boxed DnsProvider trait object
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
