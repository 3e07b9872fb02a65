// # Memory DNS Provider
//
// In-memory implementation of DnsProvider.
//
// ## Purpose
//
// Provides a provider that behaves like a value-addressed record API without
// talking to one. Useful for dry runs on a real host and for tests.
//
// ## Semantics
//
// - Record sets are keyed by (name, set identifier)
// - Creating an existing record set fails
// - Deleting requires the exact current value
// - Listing starts at (name, start identifier) and returns at most
//   `MAX_LIST_ITEMS` record sets in key order
// - All state is lost on restart

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::dns_provider::{DnsProvider, DnsProviderFactory, RecordSet};

/// Page size of `list_records`
pub const MAX_LIST_ITEMS: usize = 10;

type RecordKey = (String, String);

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<RecordKey, RecordSet>,
    creates: usize,
    deletes: usize,
}

/// In-memory DNS provider implementation
///
/// Clones share the same record set.
///
/// # Example
///
/// ```rust,no_run
/// use ecssd_core::provider::MemoryDnsProvider;
/// use ecssd_core::traits::DnsProvider;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let provider = MemoryDnsProvider::new();
///     let records = provider.list_records("web.servicediscovery.internal", "abc").await?;
///     assert!(records.is_empty());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDnsProvider {
    inner: Arc<RwLock<Inner>>,
}

fn key_of(name: &str, set_identifier: &str) -> RecordKey {
    (name.trim_end_matches('.').to_string(), set_identifier.to_string())
}

impl MemoryDnsProvider {
    /// Create a new empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of record sets
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Check if there are no record sets
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }

    /// All record sets, in key order
    pub async fn records(&self) -> Vec<RecordSet> {
        self.inner.read().await.records.values().cloned().collect()
    }

    /// Number of successful creates
    pub async fn create_count(&self) -> usize {
        self.inner.read().await.creates
    }

    /// Number of successful deletes
    pub async fn delete_count(&self) -> usize {
        self.inner.read().await.deletes
    }

    /// Number of successful mutations of any kind
    pub async fn mutation_count(&self) -> usize {
        let guard = self.inner.read().await;
        guard.creates + guard.deletes
    }
}

#[async_trait]
impl DnsProvider for MemoryDnsProvider {
    async fn create_record(&self, record: &RecordSet) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let key = key_of(&record.name, &record.set_identifier);
        if guard.records.contains_key(&key) {
            return Err(Error::already_exists(record.key()));
        }
        guard.records.insert(key, record.clone());
        guard.creates += 1;
        Ok(())
    }

    async fn list_records(
        &self,
        name: &str,
        start_identifier: &str,
    ) -> Result<Vec<RecordSet>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .records
            .range(key_of(name, start_identifier)..)
            .take(MAX_LIST_ITEMS)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn delete_record(&self, record: &RecordSet) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let key = key_of(&record.name, &record.set_identifier);
        match guard.records.get(&key) {
            None => Err(Error::not_found(record.key())),
            Some(existing) if existing.value != record.value => Err(Error::invalid_input(format!(
                "value mismatch for {}: have '{}', asked to delete '{}'",
                record.key(),
                existing.value,
                record.value
            ))),
            Some(_) => {
                guard.records.remove(&key);
                guard.deletes += 1;
                Ok(())
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for creating memory providers
pub struct MemoryFactory;

impl DnsProviderFactory for MemoryFactory {
    fn create(&self, config: &crate::config::ProviderConfig) -> Result<Box<dyn DnsProvider>, Error> {
        match config {
            crate::config::ProviderConfig::Memory => Ok(Box::new(MemoryDnsProvider::new())),
            _ => Err(Error::config("Invalid config for memory provider")),
        }
    }
}
