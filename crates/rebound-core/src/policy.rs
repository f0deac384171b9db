//! Retry policy: interval strategy, budget gate, code allowlist, attempt cap.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::backoff::{Backoff, Interval};
use crate::budget::Budget;
use crate::classify::RETRYABLE_CODES;

/// Configuration for one retry session. Typically built per call-site and
/// immutable while the session runs; the budget inside is the long-lived,
/// process-wide piece.
#[derive(Clone)]
pub struct Policy {
    /// Sleep strategy between attempts. `None` is a misconfiguration that
    /// the loop repairs with a safe fixed delay instead of failing.
    pub interval: Option<Arc<dyn Interval>>,
    /// Admission-control gate consulted before attempts; `None` disables
    /// budget gating entirely.
    pub budget: Option<Arc<dyn Budget>>,
    /// Allowlist of retryable status codes. `None` retries on any error;
    /// with a list, errors lacking a code are not retried.
    pub on_codes: Option<Vec<u16>>,
    /// Total attempt cap, including the first attempt. Zero means unbounded.
    pub attempts: u32,
    /// Whether the budget also gates the very first attempt of a session.
    /// Off by default: the budget exists to damp retry amplification, and
    /// admission control for brand-new work belongs to the caller.
    pub gate_first_attempt: bool,
}

impl Default for Policy {
    /// Unlimited attempts, retry on any error, jittered exponential backoff
    /// from 500ms to 5s.
    fn default() -> Self {
        Self {
            interval: Some(Arc::new(
                Backoff::new(Duration::from_millis(500), Duration::from_secs(5), 1.5)
                    .with_jitter(0.2, SmallRng::from_entropy()),
            )),
            budget: None,
            on_codes: None,
            attempts: 0,
            gate_first_attempt: false,
        }
    }
}

impl Policy {
    /// Indefinite retry against a remote service, restricted to the
    /// conventionally retryable status codes (see
    /// [`RETRYABLE_CODES`]). Cancel the session's token to stop.
    pub fn on_retryable() -> Self {
        Self {
            on_codes: Some(RETRYABLE_CODES.to_vec()),
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Arc<dyn Interval>) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_budget(mut self, budget: Arc<dyn Budget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}
