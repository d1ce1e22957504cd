//! Bounded, retried background delivery of telemetry records.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::sink::SinkError;

/// Retry and timeout policy applied to every queued record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Attempts after the first failure.
    pub retries: u32,
    /// Upper bound on all attempts for one record, backoff included.
    pub timeout: Duration,
    /// Delay before the first retry; doubles on each further retry.
    pub base_backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_secs(5),
            base_backoff: Duration::from_millis(200),
        }
    }
}

/// Runs `operation` until it succeeds, the retry budget is spent, or the
/// policy timeout elapses.
pub async fn deliver<F, Fut>(policy: DeliveryPolicy, operation: F) -> Result<(), SinkError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), SinkError>>,
{
    let attempts = async {
        let mut backoff = policy.base_backoff;
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < policy.retries => {
                    attempt += 1;
                    debug!(attempt, error = %err, "telemetry delivery failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => return Err(err),
            }
        }
    };

    match tokio::time::timeout(policy.timeout, attempts).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout(policy.timeout)),
    }
}

/// A queue of in-flight deliveries that an entry point drains before
/// returning.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct DeliveryQueue {
    policy: DeliveryPolicy,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl DeliveryQueue {
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self {
            policy,
            tasks: Arc::default(),
        }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Queues a delivery without waiting for it. `on_failure` runs once if
    /// every attempt fails.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<F, Fut, E>(&self, operation: F, on_failure: E)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SinkError>> + Send + 'static,
        E: FnOnce(SinkError) + Send + 'static,
    {
        let policy = self.policy;
        let task = async move {
            if let Err(err) = deliver(policy, operation).await {
                on_failure(err);
            }
        };

        match self.tasks.lock() {
            Ok(mut tasks) => {
                tasks.spawn(task);
            }
            Err(_) => warn!("telemetry queue lock poisoned, record dropped"),
        }
    }

    /// Number of deliveries not yet reaped by [`drain`](Self::drain).
    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    /// Waits until every queued delivery, including ones queued while
    /// draining, has settled.
    pub async fn drain(&self) {
        loop {
            let mut batch = match self.tasks.lock() {
                Ok(mut tasks) => std::mem::take(&mut *tasks),
                Err(_) => return,
            };
            if batch.is_empty() {
                return;
            }
            while let Some(joined) = batch.join_next().await {
                if let Err(err) = joined {
                    warn!(error = %err, "telemetry delivery task aborted");
                }
            }
        }
    }
}
