//! TOML configuration for Resonance.
//!
//! Layered the usual way: compiled-in defaults, overridable by a TOML file
//! found via `RESONANCE_CONFIG` or the standard system location.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::{DetectError, FitParams};
use crate::watchdog::WatchdogPolicy;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "RESONANCE_CONFIG";

/// Standard system location, tried when `RESONANCE_CONFIG` is unset or unusable.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/resonance/resonance.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the resonance process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResonanceConfig {
    #[serde(default)]
    pub forest: ForestConfig,
    #[serde(default)]
    pub watchdog: WatchdogPolicy,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ResonanceConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded resonance configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `RESONANCE_CONFIG` environment variable.
    /// 2. `/etc/resonance/resonance.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "RESONANCE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Check every section against its allowed ranges.
    pub fn validate(&self) -> Result<(), DetectError> {
        self.forest.validate()?;
        self.watchdog.validate()?;
        self.simulation.validate()?;
        Ok(())
    }

    /// Render as TOML (used by `resonance config`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize configuration")
    }
}

// ---------------------------------------------------------------------------
// Forest
// ---------------------------------------------------------------------------

/// Isolation ensemble parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub tree_count: usize,
    pub sample_size: usize,
    /// Fixed seed for reproducible models; omit for a fresh model every run.
    pub seed: Option<u64>,
    /// Expected share of anomalies in the training data. When set, the
    /// per-sample verdict threshold is calibrated from the training scores.
    pub contamination: Option<f64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        let params = FitParams::default();
        Self {
            tree_count: params.tree_count,
            sample_size: params.sample_size,
            seed: params.seed,
            contamination: None,
        }
    }
}

impl ForestConfig {
    pub fn fit_params(&self) -> FitParams {
        FitParams {
            tree_count: self.tree_count,
            sample_size: self.sample_size,
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        self.fit_params().validate()?;
        if let Some(c) = self.contamination {
            if !(c > 0.0 && c <= 0.5) {
                return Err(DetectError::InvalidConfiguration {
                    parameter: "contamination",
                    reason: format!("must be in (0, 0.5], got {}", c),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Simulated telemetry source and monitor loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Baseline samples collected before fitting.
    pub training_samples: usize,
    /// Delay between monitor ticks (milliseconds).
    pub interval_ms: u64,
    /// Number of recent observations handed to the scorer.
    pub window_size: usize,
    /// Marker file whose presence switches the simulated host to the attack profile.
    pub trigger_file: PathBuf,
    /// Seed for the simulated host; omit for live-looking noise.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            training_samples: 200,
            interval_ms: 500,
            window_size: 50,
            trigger_file: PathBuf::from("trigger.txt"),
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), DetectError> {
        let checks: [(&'static str, bool); 3] = [
            ("training_samples", self.training_samples > 0),
            ("interval_ms", self.interval_ms > 0),
            ("window_size", self.window_size > 0),
        ];
        for (parameter, ok) in checks {
            if !ok {
                return Err(DetectError::InvalidConfiguration {
                    parameter,
                    reason: "must be positive, got 0".to_string(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
