use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Backoff interval parameters (the `[backoff]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Minimum backoff in milliseconds.
    pub min_ms: u64,
    /// Maximum backoff in milliseconds.
    pub max_ms: u64,
    /// Multiplier applied per attempt.
    pub factor: f64,
    /// Jitter fraction in [0, 1].
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_ms: 500,
            max_ms: 5_000,
            factor: 1.5,
            jitter: 0.2,
        }
    }
}

impl BackoffConfig {
    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

/// Retry budget parameters (optional `[budget]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Trailing window length in seconds for both rate estimators.
    pub window_secs: usize,
    /// Maximum tolerated failure/success ratio before throttling retries.
    pub ratio: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            ratio: 0.1,
        }
    }
}

/// Global configuration loaded from `~/.config/rebound/config.toml`.
/// Used by the CLI to seed simulator defaults; in-code policies remain the
/// programmatic surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReboundConfig {
    pub backoff: BackoffConfig,
    /// Optional budget; absent means budget gating is disabled.
    pub budget: Option<BudgetConfig>,
    /// Attempt cap including the first attempt (0 = unbounded).
    pub attempts: u32,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rebound")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ReboundConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ReboundConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: ReboundConfig = toml::from_str(&data)?;
    Ok(cfg)
}
