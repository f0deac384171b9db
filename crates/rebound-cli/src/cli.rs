use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use rebound_core::config::{self, ReboundConfig};
use rebound_core::{run_with_retry, Backoff, Budget, Coded, Policy, RatioBudget};

/// Top-level CLI for the rebound retry simulator.
#[derive(Debug, Parser)]
#[command(name = "rebound")]
#[command(about = "rebound: backoff and retry-budget simulator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Print the backoff calculation for each attempt, to help pick
    /// interval parameters. Defaults come from the config file.
    Simulate {
        /// Minimum backoff in milliseconds.
        #[arg(long)]
        min_ms: Option<u64>,

        /// Maximum backoff in milliseconds.
        #[arg(long)]
        max_ms: Option<u64>,

        /// Multiplier applied per attempt.
        #[arg(long)]
        factor: Option<f64>,

        /// Jitter fraction between 0 and 1.
        #[arg(long)]
        jitter: Option<f64>,

        /// Number of attempts to simulate.
        #[arg(long, default_value_t = 10)]
        attempts: u32,

        /// RNG seed for reproducible jitter (omitted: seeded from entropy).
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run a live retry session against a synthetic flaky operation and
    /// report what the orchestrator did.
    Drill {
        /// Failures before the synthetic operation starts succeeding.
        #[arg(long, default_value_t = 3)]
        failures: u32,

        /// Status code reported by each synthetic failure.
        #[arg(long, default_value_t = 503)]
        code: u16,

        /// Attempt cap including the first attempt (0 = unbounded).
        #[arg(long)]
        attempts: Option<u32>,
    },
}

#[derive(Debug, Error)]
#[error("synthetic failure with status {0}")]
struct DrillError(u16);

impl Coded for DrillError {
    fn code(&self) -> Option<u16> {
        Some(self.0)
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Simulate {
                min_ms,
                max_ms,
                factor,
                jitter,
                attempts,
                seed,
            } => {
                let min = min_ms.unwrap_or(cfg.backoff.min_ms);
                let max = max_ms.unwrap_or(cfg.backoff.max_ms);
                let factor = factor.unwrap_or(cfg.backoff.factor);
                let jitter = jitter.unwrap_or(cfg.backoff.jitter);
                println!(
                    "simulating {} attempts: min {}ms max {}ms factor {} jitter {}\n",
                    attempts, min, max, factor, jitter
                );

                let rng = match seed {
                    Some(s) => SmallRng::seed_from_u64(s),
                    None => SmallRng::from_entropy(),
                };
                let backoff = Backoff::new(
                    Duration::from_millis(min),
                    Duration::from_millis(max),
                    factor,
                )
                .with_jitter(jitter, rng);

                for attempt in 1..=attempts {
                    println!("{}", backoff.explain(attempt));
                }
            }

            CliCommand::Drill {
                failures,
                code,
                attempts,
            } => {
                let policy = drill_policy(&cfg, attempts.unwrap_or(cfg.attempts));
                let cancel = CancellationToken::new();
                let started = Instant::now();

                let result = run_with_retry(&cancel, &policy, |attempt| async move {
                    if attempt <= failures {
                        Err(DrillError(code))
                    } else {
                        Ok(attempt)
                    }
                })
                .await;

                match result {
                    Ok(attempt) => println!(
                        "succeeded on attempt {} after {:?}",
                        attempt,
                        started.elapsed()
                    ),
                    Err(err) => println!("gave up after {:?}: {}", started.elapsed(), err),
                }
            }
        }
        Ok(())
    }
}

/// Build a drill policy from the config file: its backoff section, plus a
/// ratio budget when one is configured.
fn drill_policy(cfg: &ReboundConfig, attempts: u32) -> Policy {
    let backoff = Backoff::new(cfg.backoff.min(), cfg.backoff.max(), cfg.backoff.factor)
        .with_jitter(cfg.backoff.jitter, SmallRng::from_entropy());
    let mut policy = Policy::on_retryable()
        .with_interval(Arc::new(backoff))
        .with_attempts(attempts);
    if let Some(budget) = &cfg.budget {
        policy = policy.with_budget(Arc::new(RatioBudget::with_window(
            budget.ratio,
            budget.window_secs,
        )) as Arc<dyn Budget>);
    }
    policy
}
