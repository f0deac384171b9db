//! Sliding-window hit rate estimation with sub-bucket interpolation.
//!
//! The estimator keeps a fixed ring of one-second buckets and reports a
//! trailing hits-per-second rate. One extra bucket beyond the window is
//! retained so the oldest bucket can be fractionally weighted as it ages
//! out, which keeps the reported rate from stepping at second boundaries.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Window length used by the budget estimators (one minute of one-second buckets).
pub const DEFAULT_WINDOW_SECS: usize = 60;

/// Trailing hits-per-second estimator over a fixed window of one-second buckets.
///
/// Memory is fixed at `window + 1` buckets; advancing the window is O(seconds
/// elapsed) capped at the ring size, with no allocation after construction.
/// Not internally synchronized: callers that share an estimator must hold
/// their own lock (see [`crate::budget::RatioBudget`]).
#[derive(Debug, Clone)]
pub struct SlidingRate {
    /// Ring of hit counts; `head` indexes the current (newest) bucket.
    buckets: Vec<u64>,
    head: usize,
    /// Buckets observed since creation, saturating at `window + 1`.
    /// Zero means no sample has been recorded yet.
    observed: usize,
    /// Timestamp of the most recent `add` or `rate` call.
    last: SystemTime,
    window: usize,
}

impl Default for SlidingRate {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS)
    }
}

impl SlidingRate {
    /// Create an estimator over a trailing window of `window_secs` seconds.
    pub fn new(window_secs: usize) -> Self {
        let window = window_secs.max(1);
        Self {
            buckets: vec![0; window + 1],
            head: 0,
            observed: 0,
            last: UNIX_EPOCH,
            window,
        }
    }

    /// Record `hits` at time `now`.
    ///
    /// A `now` earlier than the most recent call is a clock regression and is
    /// ignored; the window never moves backward.
    pub fn add(&mut self, now: SystemTime, hits: u64) {
        if whole_secs(now).is_none() {
            return;
        }
        if self.observed > 0 && now < self.last {
            return;
        }
        self.advance(now);
        self.buckets[self.head] += hits;
    }

    /// Interpolated hits-per-second over the trailing window, as of `now`.
    ///
    /// Returns `NaN` when `now` precedes the most recent call (an invalid
    /// query; callers must treat it as "no data", never as zero) and `0.0`
    /// before any sample has been recorded.
    pub fn rate(&mut self, now: SystemTime) -> f64 {
        if whole_secs(now).is_none() {
            return f64::NAN;
        }
        if self.observed == 0 {
            return 0.0;
        }
        if now < self.last {
            return f64::NAN;
        }
        self.advance(now);

        if self.observed <= self.window {
            // Window not yet full: average over time actually observed,
            // clamped to one second so sub-second bursts don't blow up.
            let sum: u64 = self.buckets.iter().sum();
            let mut secs = (self.observed - 1) as f64 + subsec_fraction(self.last);
            if secs < 1.0 {
                secs = 1.0;
            }
            sum as f64 / secs
        } else {
            // Full window: weight the oldest bucket by how much of its
            // one-second span still falls inside the trailing window.
            let oldest = (self.head + 1) % self.buckets.len();
            let weight = 1.0 - subsec_fraction(self.last);
            let mut sum = weight * self.buckets[oldest] as f64;
            for (i, &count) in self.buckets.iter().enumerate() {
                if i != oldest {
                    sum += count as f64;
                }
            }
            sum / self.window as f64
        }
    }

    /// Shift the ring forward to `now`, zeroing newly exposed buckets.
    /// Shared by `add` and `rate`; callers have already rejected regressions.
    fn advance(&mut self, now: SystemTime) {
        if self.observed == 0 {
            self.observed = 1;
            self.last = now;
            return;
        }
        let (now_s, last_s) = match (whole_secs(now), whole_secs(self.last)) {
            (Some(n), Some(l)) => (n, l),
            _ => return,
        };
        if now_s > last_s {
            let n = (now_s - last_s).min(self.buckets.len() as u64) as usize;
            for _ in 0..n {
                self.head = (self.head + 1) % self.buckets.len();
                self.buckets[self.head] = 0;
            }
            self.observed = (self.observed + n).min(self.buckets.len());
        }
        self.last = now;
    }
}

/// Whole seconds since the Unix epoch, or `None` for pre-epoch timestamps.
/// Bucket boundaries are aligned to absolute seconds so the interpolation
/// fraction reflects wall-clock phase, not the phase of the first sample.
fn whole_secs(t: SystemTime) -> Option<u64> {
    t.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

/// Sub-second part of `t` in `[0, 1)`.
fn subsec_fraction(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| f64::from(d.subsec_nanos()) / 1e9)
        .unwrap_or(0.0)
}
