//! Retry loop: run an operation until success, a terminal error, the attempt
//! cap, or cancellation.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::backoff::{FixedDelay, Interval};
use crate::classify::{self, Coded};
use crate::error::RetryError;
use crate::policy::Policy;

/// Delay substituted when a policy arrives without an interval strategy.
const FALLBACK_DELAY: Duration = Duration::from_millis(500);

/// Runs `op` under `policy` until it succeeds or the policy says to stop.
///
/// The operation receives the 1-based attempt number. Outcomes are recorded
/// into the policy's budget; when the budget reports over, an iteration
/// sleeps one backoff interval without invoking the operation (or recording
/// anything), so allowed-through traffic remains the budget's only signal.
/// Sleeps race against `cancel`, so a cancelled session returns promptly
/// instead of finishing a pending backoff.
pub async fn run_with_retry<T, E, F, Fut>(
    cancel: &CancellationToken,
    policy: &Policy,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Coded + std::error::Error,
{
    let interval: Arc<dyn Interval> = match &policy.interval {
        Some(i) => Arc::clone(i),
        None => {
            tracing::warn!(
                "retry policy has no interval strategy, substituting a {:?} fixed delay",
                FALLBACK_DELAY
            );
            Arc::new(FixedDelay(FALLBACK_DELAY))
        }
    };

    let mut attempt: u32 = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        if let Some(budget) = &policy.budget {
            // With first-attempt gating off, `attempt > 1` implies at least
            // one real attempt has already run.
            let gated = policy.gate_first_attempt || attempt > 1;
            if gated && budget.is_over(SystemTime::now()) {
                tracing::debug!(attempt, "over retry budget, backing off without attempting");
                sleep_or_cancel(cancel, interval.next(attempt)).await?;
                attempt += 1;
                continue;
            }
        }

        match op(attempt).await {
            Ok(value) => {
                if let Some(budget) = &policy.budget {
                    budget.record_success(SystemTime::now(), 1);
                }
                return Ok(value);
            }
            Err(err) => {
                if let Some(budget) = &policy.budget {
                    budget.record_failure(SystemTime::now(), 1);
                }
                if policy.attempts != 0 && attempt >= policy.attempts {
                    tracing::debug!(attempt, error = %err, "attempt cap reached");
                    return Err(RetryError::Operation(err));
                }
                if !classify::is_retryable(policy.on_codes.as_deref(), &err) {
                    tracing::debug!(code = ?err.code(), error = %err, "error is not retryable");
                    return Err(RetryError::Operation(err));
                }
                let delay = interval.next(attempt);
                tracing::debug!(attempt, ?delay, error = %err, "attempt failed, retrying");
                sleep_or_cancel(cancel, delay).await?;
                attempt += 1;
            }
        }
    }
}

async fn sleep_or_cancel<E: std::error::Error>(
    cancel: &CancellationToken,
    delay: Duration,
) -> Result<(), RetryError<E>> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RetryError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
