//! Built-in DNS provider implementations

pub mod memory;

pub use memory::MemoryDnsProvider;
