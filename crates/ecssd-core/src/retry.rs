//! Backoff state machine for DNS mutations
//!
//! Every create or delete issued by a reconciliation action runs through
//! [`retry_mutation`]. The loop is driven by [`Backoff`], which only decides;
//! sleeping and escalation are left to the caller.
//!
//! ## Sequence
//!
//! With the default [`RetryConfig`] the wait counter starts at 1 second and
//! grows by 2 seconds per failure. A failure observed while the counter is
//! above 8 seconds is fatal:
//!
//! ```text
//! attempt:  1     2     3     4     5
//! failure:  wait1 wait3 wait5 wait7 fatal (counter = 9)
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Decision taken after observing one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The attempt succeeded
    Success,
    /// Sleep for the given duration, then try again
    RetryAfter(Duration),
    /// The failure budget is spent; escalate
    FatalAbort,
}

/// Per-mutation backoff counter
///
/// Scoped to a single mutation call and never shared across events.
#[derive(Debug, Clone)]
pub struct Backoff {
    step: Duration,
    threshold: Duration,
    next_wait: Duration,
    attempts: u32,
    waited: Duration,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            step: Duration::from_secs(config.backoff_step_secs),
            threshold: Duration::from_secs(config.fatal_threshold_secs),
            next_wait: Duration::from_secs(config.initial_backoff_secs),
            attempts: 0,
            waited: Duration::ZERO,
        }
    }

    /// Record the outcome of an attempt and decide what happens next
    pub fn observe<T>(&mut self, outcome: &Result<T>) -> RetryDecision {
        self.attempts += 1;
        if outcome.is_ok() {
            return RetryDecision::Success;
        }
        if self.next_wait > self.threshold {
            return RetryDecision::FatalAbort;
        }

        let wait = self.next_wait;
        self.waited += wait;
        self.next_wait += self.step;
        RetryDecision::RetryAfter(wait)
    }

    /// Attempts observed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Total backoff handed out so far
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Wait that the next failure would be given
    pub fn next_wait(&self) -> Duration {
        self.next_wait
    }
}

/// Run `attempt` until it succeeds or the backoff budget is spent
///
/// # Parameters
///
/// - `config`: Backoff policy
/// - `operation`: Mutation kind for logs and errors ("create", "delete")
/// - `record`: Record key for logs and errors
/// - `attempt`: Produces one provider call per invocation
///
/// # Returns
///
/// - `Ok(T)`: The first successful attempt's value
/// - `Err(Error::RetryBudgetExhausted)`: The last failure, wrapped; this
///   error is fatal (see [`Error::is_fatal`])
pub async fn retry_mutation<T, F, Fut>(
    config: &RetryConfig,
    operation: &'static str,
    record: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(config);

    loop {
        let outcome = attempt().await;
        match backoff.observe(&outcome) {
            RetryDecision::Success => return outcome,
            RetryDecision::RetryAfter(wait) => {
                if let Err(e) = &outcome {
                    warn!(
                        operation,
                        record,
                        attempt = backoff.attempts(),
                        wait_secs = wait.as_secs(),
                        error = %e,
                        "DNS mutation failed, retrying"
                    );
                }
                tokio::time::sleep(wait).await;
            }
            RetryDecision::FatalAbort => {
                return match outcome {
                    Ok(value) => Ok(value),
                    Err(source) => Err(Error::RetryBudgetExhausted {
                        operation,
                        record: record.to_string(),
                        attempts: backoff.attempts(),
                        waited: backoff.waited(),
                        source: Box::new(source),
                    }),
                };
            }
        }
    }
}
