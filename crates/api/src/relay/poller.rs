//! Pull-side companion of a relay connection.
//!
//! While a client is attached, [`Poller::run`] queries the upstream every
//! `poll_interval` and feeds each snapshot into the registry, racing the
//! webhook path. Retryable failures back off exponentially; a failure that
//! cannot or may no longer be retried is returned to the relay, and the
//! registry is left untouched for it.

use std::sync::Arc;
use std::time::Duration;

use relay_core::types::TaskId;
use relay_novita::{TaskSource, UpstreamError};
use relay_registry::{TaskRegistry, UpdateOutcome};
use tokio_util::sync::CancellationToken;

/// Upper bound on the delay between polls after failures.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Factor by which the delay grows after each consecutive failure.
const BACKOFF_MULTIPLIER: u32 = 2;

pub struct Poller {
    pub upstream: Arc<dyn TaskSource>,
    pub registry: Arc<TaskRegistry>,
    pub task_id: TaskId,
    pub callback_url: Option<String>,
    pub interval: Duration,
    /// Hard deadline for each query.
    pub deadline: Duration,
    /// Consecutive retryable failures tolerated before giving up.
    pub max_retries: u32,
}

/// Delay after `failures` consecutive failures, clamped to [`MAX_BACKOFF`].
pub fn backoff_delay(interval: Duration, failures: u32) -> Duration {
    let factor = BACKOFF_MULTIPLIER.saturating_pow(failures);
    interval.saturating_mul(factor).min(MAX_BACKOFF.max(interval))
}

impl Poller {
    /// Poll until the registry holds a terminal record, `cancel` fires, or a failure must
    /// be surfaced.
    ///
    /// Returns `Some(error)` only for a failure the relay should report.
    pub async fn run(self, cancel: CancellationToken) -> Option<UpstreamError> {
        let mut failures = 0u32;
        let mut delay = self.interval;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                result = self.upstream.query_task(
                    &self.task_id,
                    self.callback_url.as_deref(),
                    self.deadline,
                ) => result,
            };

            match result {
                Ok(snapshot) => {
                    failures = 0;
                    delay = self.interval;
                    let terminal = snapshot.status.is_terminal();
                    let outcome = self.registry.update(snapshot).await;
                    // A terminal answer that lost to a newer record is
                    // retried on the next tick.
                    let recorded = match outcome {
                        UpdateOutcome::RejectedTerminal => true,
                        UpdateOutcome::RejectedStale => false,
                        UpdateOutcome::Created | UpdateOutcome::Applied => terminal,
                    };
                    if recorded {
                        tracing::debug!(task_id = %self.task_id, "Poller observed terminal state");
                        return None;
                    }
                    if terminal {
                        tracing::debug!(
                            task_id = %self.task_id,
                            outcome = outcome.as_str(),
                            "Terminal poll result not applied, polling again",
                        );
                    }
                }
                Err(e) if e.is_retryable() && failures < self.max_retries => {
                    failures += 1;
                    delay = backoff_delay(self.interval, failures);
                    tracing::warn!(
                        task_id = %self.task_id,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Task poll failed, retrying",
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = %self.task_id,
                        failures,
                        error = %e,
                        "Task poll failed, giving up",
                    );
                    return Some(e);
                }
            }
        }
    }
}
