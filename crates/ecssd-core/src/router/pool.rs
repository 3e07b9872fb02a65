//! Fixed-size pool of worker slots
//!
//! The pool is a counting semaphore: acquiring takes a capacity token,
//! dropping the returned [`WorkerSlot`] puts it back. Because release is tied
//! to `Drop`, a slot is returned on every exit path of the worker that holds
//! it, including errors and panics, and can never be released twice.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded pool of interchangeable worker slots
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

/// A capacity token borrowed from a [`WorkerPool`]
///
/// The slot returns to its pool when dropped.
#[derive(Debug)]
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    /// Create a pool holding `size` slots
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Configured number of slots
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots currently in the pool (not held by a worker)
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held by workers
    pub fn in_use(&self) -> usize {
        self.size - self.available()
    }

    /// Wait up to `timeout` for a free slot
    ///
    /// # Returns
    ///
    /// - `Ok(Some(slot))`: A slot was acquired
    /// - `Ok(None)`: No slot freed up within `timeout`
    /// - `Err(Error)`: The pool was closed
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Option<WorkerSlot>> {
        match tokio::time::timeout(timeout, Arc::clone(&self.semaphore).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(Some(WorkerSlot { _permit: permit })),
            Ok(Err(_)) => Err(Error::router("worker pool closed")),
            Err(_) => Ok(None),
        }
    }

    /// Take a slot if one is free right now
    pub fn try_acquire(&self) -> Option<WorkerSlot> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| WorkerSlot { _permit: permit })
    }
}
