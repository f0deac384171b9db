//! Adaptive retry engine.
//!
//! Retries a fallible async operation under a [`Policy`] combining jittered
//! exponential backoff with an adaptive retry budget: a sliding-window
//! failure/success ratio that throttles retries while the downstream is
//! struggling, so many concurrent clients back off together instead of
//! piling on.

pub mod backoff;
pub mod budget;
pub mod classify;
pub mod config;
pub mod error;
pub mod logging;
pub mod policy;
pub mod rate;
pub mod run;

pub use backoff::{Backoff, BackoffExplain, FixedDelay, Interval};
pub use budget::{Budget, NoopBudget, RatioBudget};
pub use classify::{Coded, RETRYABLE_CODES};
pub use error::RetryError;
pub use policy::Policy;
pub use rate::SlidingRate;
pub use run::run_with_retry;
