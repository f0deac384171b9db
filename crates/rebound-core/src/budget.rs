//! Retry budget: a process-wide gate that throttles retries when recent
//! failures outweigh recent successes.
//!
//! A single budget instance is meant to be shared by every retry session
//! talking to the same downstream, so sustained failure anywhere in the
//! process dampens retry volume everywhere.

use std::sync::Mutex;
use std::time::SystemTime;

use crate::rate::SlidingRate;

/// Admission-control signal consulted by the retry loop before each attempt.
///
/// All three methods are safe to call concurrently from many sessions.
pub trait Budget: Send + Sync {
    /// Record `hits` successful operations observed at `now`.
    fn record_success(&self, now: SystemTime, hits: u64);
    /// Record `hits` failed operations observed at `now`.
    fn record_failure(&self, now: SystemTime, hits: u64);
    /// True when the recent failure rate exceeds the tolerated ratio to
    /// successes and retries should back off without attempting.
    fn is_over(&self, now: SystemTime) -> bool;
}

struct Rates {
    success: SlidingRate,
    failure: SlidingRate,
}

/// Budget comparing the trailing failure rate against the trailing success
/// rate. Over budget iff `failure / success > ratio`; never over while no
/// failures are being observed.
pub struct RatioBudget {
    ratio: f64,
    inner: Mutex<Rates>,
}

impl RatioBudget {
    /// Budget over the default one-minute window.
    pub fn new(ratio: f64) -> Self {
        Self::with_window(ratio, crate::rate::DEFAULT_WINDOW_SECS)
    }

    /// Budget with an explicit window length in seconds (both estimators
    /// share it).
    pub fn with_window(ratio: f64, window_secs: usize) -> Self {
        Self {
            ratio: ratio.max(0.0),
            inner: Mutex::new(Rates {
                success: SlidingRate::new(window_secs),
                failure: SlidingRate::new(window_secs),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Rates> {
        // A poisoned lock means a panic elsewhere mid-record; the counters
        // themselves are still consistent, so keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Budget for RatioBudget {
    fn record_success(&self, now: SystemTime, hits: u64) {
        self.lock().success.add(now, hits);
    }

    fn record_failure(&self, now: SystemTime, hits: u64) {
        self.lock().failure.add(now, hits);
    }

    fn is_over(&self, now: SystemTime) -> bool {
        let mut rates = self.lock();
        let failure = rates.failure.rate(now);
        // Covers both "no failures" and the NaN no-data sentinel.
        if !(failure > 0.0) {
            return false;
        }
        let success = rates.success.rate(now);
        if !(success > 0.0) {
            // Failures with no observed successes: maximally unfavorable.
            return true;
        }
        failure / success > self.ratio
    }
}

/// Budget that never throttles and discards all hits. Used when budget
/// gating is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBudget;

impl Budget for NoopBudget {
    fn record_success(&self, _now: SystemTime, _hits: u64) {}
    fn record_failure(&self, _now: SystemTime, _hits: u64) {}
    fn is_over(&self, _now: SystemTime) -> bool {
        false
    }
}
