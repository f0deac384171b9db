//! End-to-end retry sessions: orchestration loop, budget gating, and
//! cancellation working together.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use rebound_core::{
    run_with_retry, Budget, Coded, FixedDelay, Policy, RatioBudget,
};

#[derive(Debug, Error)]
#[error("upstream returned {0}")]
struct UpstreamError(u16);

impl Coded for UpstreamError {
    fn code(&self) -> Option<u16> {
        Some(self.0)
    }
}

fn policy_ms(delay_ms: u64) -> Policy {
    Policy::default().with_interval(Arc::new(FixedDelay(Duration::from_millis(delay_ms))))
}

/// Budget that is over for a fixed number of queries, then under forever.
struct OverForQueries {
    remaining: Mutex<u32>,
    successes: AtomicU32,
    failures: AtomicU32,
}

impl OverForQueries {
    fn new(queries: u32) -> Self {
        Self {
            remaining: Mutex::new(queries),
            successes: AtomicU32::new(0),
            failures: AtomicU32::new(0),
        }
    }
}

impl Budget for OverForQueries {
    fn record_success(&self, _now: SystemTime, hits: u64) {
        self.successes.fetch_add(hits as u32, Ordering::SeqCst);
    }

    fn record_failure(&self, _now: SystemTime, hits: u64) {
        self.failures.fetch_add(hits as u32, Ordering::SeqCst);
    }

    fn is_over(&self, _now: SystemTime) -> bool {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[tokio::test(start_paused = true)]
async fn recovers_after_transient_failures() {
    let cancel = CancellationToken::new();
    let attempts_seen = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&attempts_seen);

    let result = run_with_retry(&cancel, &policy_ms(50), move |attempt| {
        seen.lock().unwrap().push(attempt);
        async move {
            if attempt < 4 {
                Err(UpstreamError(503))
            } else {
                Ok("ready")
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), "ready");
    assert_eq!(*attempts_seen.lock().unwrap(), vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn blocked_iterations_skip_the_operation_and_record_nothing() {
    let cancel = CancellationToken::new();
    let budget = Arc::new(OverForQueries::new(2));
    let policy = policy_ms(50).with_budget(Arc::clone(&budget) as Arc<dyn Budget>);
    let attempts_seen = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&attempts_seen);

    let result = run_with_retry(&cancel, &policy, move |attempt| {
        seen.lock().unwrap().push(attempt);
        async move {
            if attempt == 1 {
                Err(UpstreamError(500))
            } else {
                Ok(attempt)
            }
        }
    })
    .await;

    // Attempt 1 ran and failed; iterations 2 and 3 were budget-blocked
    // (operation skipped, attempt number still advanced); attempt 4 ran.
    assert_eq!(result.unwrap(), 4);
    assert_eq!(*attempts_seen.lock().unwrap(), vec![1, 4]);
    assert_eq!(budget.failures.load(Ordering::SeqCst), 1);
    assert_eq!(budget.successes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn first_attempt_gating_is_opt_in() {
    let cancel = CancellationToken::new();
    let op_calls = Arc::new(AtomicUsize::new(0));

    // Default: an over-budget gate does not block a session's first attempt.
    let budget = Arc::new(OverForQueries::new(u32::MAX));
    let policy = policy_ms(50).with_budget(Arc::clone(&budget) as Arc<dyn Budget>);
    let calls = Arc::clone(&op_calls);
    let result = run_with_retry(&cancel, &policy, move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, UpstreamError>(()) }
    })
    .await;
    assert!(result.is_ok());
    assert_eq!(op_calls.load(Ordering::SeqCst), 1);

    // Opted in: the first attempt is gated too, and only cancellation ends
    // the session.
    let mut gated = policy_ms(50).with_budget(Arc::new(OverForQueries::new(u32::MAX)));
    gated.gate_first_attempt = true;
    let calls = Arc::clone(&op_calls);
    let session_cancel = CancellationToken::new();
    let token = session_cancel.clone();
    let handle = tokio::spawn(async move {
        run_with_retry(&token, &gated, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, UpstreamError>(()) }
        })
        .await
    });
    tokio::task::yield_now().await;
    session_cancel.cancel();
    let result = handle.await.unwrap();
    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(op_calls.load(Ordering::SeqCst), 1, "gated session never ran the operation");
}

#[tokio::test(start_paused = true)]
async fn ratio_budget_throttles_until_other_traffic_recovers() {
    // Process-wide budget shared with other sessions: a failure burst has
    // already pushed it over.
    let budget = Arc::new(RatioBudget::with_window(0.5, 60));
    let now = SystemTime::now();
    budget.record_failure(now, 100);
    budget.record_success(now, 1);
    assert!(budget.is_over(now));

    let cancel = CancellationToken::new();
    let policy = policy_ms(2_000).with_budget(Arc::clone(&budget) as Arc<dyn Budget>);
    let attempts_seen = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&attempts_seen);

    // Other allowed-through traffic keeps succeeding while this session is
    // throttled; that success volume is what brings the budget back under.
    let other_traffic = Arc::clone(&budget);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        other_traffic.record_success(SystemTime::now(), 10_000);
    });

    let result = run_with_retry(&cancel, &policy, move |attempt| {
        seen.lock().unwrap().push(attempt);
        async move {
            if attempt == 1 {
                Err(UpstreamError(503))
            } else {
                Ok(())
            }
        }
    })
    .await;

    assert!(result.is_ok());
    let seen = attempts_seen.lock().unwrap();
    // First attempt ran unconditionally; at least one throttled iteration
    // passed before the budget recovered and the next real attempt ran.
    assert_eq!(seen[0], 1);
    assert_eq!(seen.len(), 2);
    assert!(seen[1] > 2, "expected at least one budget-blocked iteration");
}

#[tokio::test(start_paused = true)]
async fn exhaustion_surfaces_the_final_error() {
    let cancel = CancellationToken::new();
    let result: Result<(), _> =
        run_with_retry(&cancel, &policy_ms(10).with_attempts(5), |attempt| async move {
            Err(UpstreamError(500 + attempt as u16))
        })
        .await;
    let err = result.unwrap_err().into_operation().expect("operation error");
    assert_eq!(err.0, 505);
}
