//! Error types for the ecssd agent
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for ecssd operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the ecssd agent
#[derive(Error, Debug)]
pub enum Error {
    /// Container runtime errors (event subscription, transport)
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Container inspection failed for a specific instance
    #[error("Inspection of {instance_id} failed: {message}")]
    Inspection {
        /// Instance (container) identifier
        instance_id: String,
        /// Error message
        message: String,
    },

    /// DNS provider-related errors
    #[error("DNS provider error: {0}")]
    DnsProvider(String),

    /// A mutation kept failing until the backoff counter crossed its threshold
    #[error("{operation} for {record} failed after {attempts} attempt(s) ({waited:?} backoff): {source}")]
    RetryBudgetExhausted {
        /// Mutation kind ("create" or "delete")
        operation: &'static str,
        /// Record name and set identifier
        record: String,
        /// Number of attempts made
        attempts: u32,
        /// Total time spent sleeping between attempts
        waited: Duration,
        /// Last provider error
        #[source]
        source: Box<Error>,
    },

    /// Router lifecycle errors
    #[error("Router error: {0}")]
    Router(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (from provider or runtime APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Record already exists
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create a runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Create an inspection error
    pub fn inspection(instance_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inspection {
            instance_id: instance_id.into(),
            message: message.into(),
        }
    }

    /// Create a DNS provider error
    pub fn dns_provider(msg: impl Into<String>) -> Self {
        Self::DnsProvider(msg.into())
    }

    /// Create a router error
    pub fn router(msg: impl Into<String>) -> Self {
        Self::Router(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an "already exists" error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error must terminate the agent.
    ///
    /// Exhausted retry budgets and failed container inspections cannot be
    /// recovered by this process; the daemon exits and leaves the restart to
    /// its supervisor.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RetryBudgetExhausted { .. } | Self::Inspection { .. }
        )
    }
}
