//! Backoff interval strategies: jittered exponential growth and fixed delay.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::Rng;

/// Strategy deciding how long to sleep before retry attempt `attempt` (1-based).
pub trait Interval: Send + Sync {
    fn next(&self, attempt: u32) -> Duration;
}

/// Constant sleep interval; ignores the attempt number.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl Interval for FixedDelay {
    fn next(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Exponential backoff: `min * factor^attempt`, optionally jittered, clamped
/// to `[min, max]`.
///
/// Jitter is applied only when an RNG has been injected via [`Backoff::with_jitter`];
/// without one the schedule is fully deterministic. A `factor <= 1.0` is
/// accepted and simply degenerates to a constant-`min` schedule after the
/// clamp.
#[derive(Debug)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
    rng: Option<Mutex<SmallRng>>,
}

impl Backoff {
    /// Deterministic backoff with no jitter.
    pub fn new(min: Duration, max: Duration, factor: f64) -> Self {
        Self {
            min,
            max,
            factor,
            jitter: 0.0,
            rng: None,
        }
    }

    /// Enable jitter: each delay is sampled uniformly from
    /// `[base * (1 - jitter), base * (1 + jitter)]` using the injected RNG.
    /// `jitter` is clamped to `[0, 1]`.
    pub fn with_jitter(mut self, jitter: f64, rng: SmallRng) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self.rng = Some(Mutex::new(rng));
        self
    }

    /// Decompose the calculation for attempt `attempt` without clamping,
    /// for observability and tuning. When jitter is enabled this samples the
    /// RNG, so repeated calls differ in `with_jitter` only.
    pub fn explain(&self, attempt: u32) -> BackoffExplain {
        let power_of = self.factor.powi(saturating_i32(attempt));
        let backoff_secs = self.min.as_secs_f64() * power_of;
        let (lo, hi, jittered) = match &self.rng {
            Some(rng) => {
                let spread = backoff_secs * self.jitter;
                let lo = backoff_secs - spread;
                let hi = backoff_secs + spread;
                let sample = lo + draw(rng) * (hi - lo);
                (lo, hi, sample)
            }
            None => (backoff_secs, backoff_secs, backoff_secs),
        };
        BackoffExplain {
            attempt,
            power_of,
            backoff: saturating_duration(backoff_secs),
            range_min: saturating_duration(lo),
            range_max: saturating_duration(hi),
            with_jitter: saturating_duration(jittered),
        }
    }

    /// Clamp a delay in seconds to `[min, max]`, saturating non-finite input.
    /// Max wins over min if the two are misconfigured in reverse order.
    fn clamp(&self, secs: f64) -> Duration {
        if !secs.is_finite() {
            return self.max;
        }
        let mut d = saturating_duration(secs);
        if d > self.max {
            d = self.max;
        }
        if d < self.min {
            d = self.min;
        }
        d
    }
}

impl Interval for Backoff {
    fn next(&self, attempt: u32) -> Duration {
        let base = self.min.as_secs_f64() * self.factor.powi(saturating_i32(attempt));
        let secs = match &self.rng {
            Some(rng) => {
                let spread = base * self.jitter;
                let lo = base - spread;
                lo + draw(rng) * (2.0 * spread)
            }
            None => base,
        };
        self.clamp(secs)
    }
}

/// The decomposed calculation behind one backoff attempt. Returned by
/// [`Backoff::explain`]; purely informational.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffExplain {
    /// Attempt number used in this explanation.
    pub attempt: u32,
    /// `factor^attempt`.
    pub power_of: f64,
    /// Unjittered backoff (`min * power_of`), before the final clamp.
    pub backoff: Duration,
    /// Lower end of the jitter range.
    pub range_min: Duration,
    /// Upper end of the jitter range.
    pub range_max: Duration,
    /// The sampled, jittered delay (equal to `backoff` when jitter is off).
    pub with_jitter: Duration,
}

impl fmt::Display for BackoffExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt: {} backoff: {:?} with-jitter: {:?} jitter range: [{:?} - {:?}]",
            self.attempt, self.backoff, self.with_jitter, self.range_min, self.range_max
        )
    }
}

fn draw(rng: &Mutex<SmallRng>) -> f64 {
    // A poisoned lock only means another caller panicked mid-sample; the RNG
    // state is still valid.
    let mut guard = rng.lock().unwrap_or_else(|e| e.into_inner());
    guard.gen::<f64>()
}

fn saturating_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn saturating_i32(attempt: u32) -> i32 {
    attempt.min(i32::MAX as u32) as i32
}
