//! TOML configuration for a scoring deployment.
//!
//! Every recognized option is an explicit field with a default; unknown keys
//! are rejected. `from_toml` / `from_file` validate before returning, so a
//! `KolConfig` obtained from them is always usable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kolscore_core::data::{BatchOptions, DataError, PriceCache, RetryPolicy};

use crate::grade::GradeWeights;
use crate::metrics::AnalyticsParams;
use crate::scoring::ScoringWindow;

/// Longest accepted delay or timeout, in seconds (one day).
const MAX_DELAY_SECS: f64 = 86_400.0;

/// Longest accepted scoring window, in days (ten years).
const MAX_WINDOW_DAYS: u32 = 3_650;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub ttl_hours: u64,
    /// Age past which `purge` removes blobs.
    pub purge_after_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache/prices"),
            ttl_hours: 24,
            purge_after_days: 7,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }

    pub fn purge_after(&self) -> Duration {
        Duration::from_secs(self.purge_after_days.saturating_mul(24 * 3600))
    }

    /// Open (creating if needed) the cache directory.
    pub fn open(&self) -> Result<PriceCache, DataError> {
        PriceCache::new(&self.dir, self.ttl())
    }
}

/// `[fetch]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub transient_delay_secs: f64,
    pub backoff_base_secs: f64,
    pub jitter_min_secs: f64,
    pub jitter_max_secs: f64,
    /// Per-request transport timeout; 0 disables it.
    pub request_timeout_secs: f64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            transient_delay_secs: 1.0,
            backoff_base_secs: 1.0,
            jitter_min_secs: 1.0,
            jitter_max_secs: 3.0,
            request_timeout_secs: 30.0,
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0.0).then(|| secs(self.request_timeout_secs))
    }
}

/// `[batch]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub inter_batch_delay_secs: f64,
    pub prefer_bulk: bool,
    pub ticker_delay_min_secs: f64,
    pub ticker_delay_max_secs: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            inter_batch_delay_secs: 3.0,
            prefer_bulk: true,
            ticker_delay_min_secs: 1.0,
            ticker_delay_max_secs: 3.0,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KolConfig {
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub batch: BatchConfig,
    pub scoring: ScoringWindow,
    pub analytics: AnalyticsParams,
    pub grade: GradeWeights,
    pub logging: LoggingConfig,
}

impl KolConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string. Missing sections
    /// and keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = &self.fetch;
        ensure(f.max_attempts >= 1, "fetch.max_attempts must be at least 1")?;
        for (name, value) in [
            ("fetch.transient_delay_secs", f.transient_delay_secs),
            ("fetch.backoff_base_secs", f.backoff_base_secs),
            ("fetch.jitter_min_secs", f.jitter_min_secs),
            ("fetch.jitter_max_secs", f.jitter_max_secs),
            ("fetch.request_timeout_secs", f.request_timeout_secs),
            ("batch.inter_batch_delay_secs", self.batch.inter_batch_delay_secs),
            ("batch.ticker_delay_min_secs", self.batch.ticker_delay_min_secs),
            ("batch.ticker_delay_max_secs", self.batch.ticker_delay_max_secs),
        ] {
            ensure(
                value.is_finite() && (0.0..=MAX_DELAY_SECS).contains(&value),
                &format!("{name} must be between 0 and {MAX_DELAY_SECS}, got {value}"),
            )?;
        }
        ensure(
            f.jitter_min_secs <= f.jitter_max_secs,
            "fetch.jitter_min_secs exceeds fetch.jitter_max_secs",
        )?;

        let b = &self.batch;
        ensure(b.batch_size >= 1, "batch.batch_size must be at least 1")?;
        ensure(
            b.ticker_delay_min_secs <= b.ticker_delay_max_secs,
            "batch.ticker_delay_min_secs exceeds batch.ticker_delay_max_secs",
        )?;

        ensure(
            self.scoring.entry_lookaround_days >= 1,
            "scoring.entry_lookaround_days must be at least 1",
        )?;
        ensure(
            self.scoring.forward_window_days >= 1,
            "scoring.forward_window_days must be at least 1",
        )?;
        ensure(
            self.scoring.entry_lookaround_days <= MAX_WINDOW_DAYS
                && self.scoring.forward_window_days <= MAX_WINDOW_DAYS,
            &format!("scoring windows are capped at {MAX_WINDOW_DAYS} days"),
        )?;

        let a = &self.analytics;
        ensure(
            a.neutral_deadband.is_finite() && a.neutral_deadband >= 0.0,
            "analytics.neutral_deadband must be a non-negative number",
        )?;
        ensure(
            a.risk_free_rate.is_finite() && a.benchmark_return.is_finite(),
            "analytics rates must be finite",
        )?;

        let g = &self.grade;
        ensure(
            g.sample_norm.is_finite() && g.sample_norm > 0.0,
            "grade.sample_norm must be positive",
        )?;
        for (name, w) in [
            ("grade.w_acc", g.w_acc),
            ("grade.w_sharpe", g.w_sharpe),
            ("grade.w_sample", g.w_sample),
        ] {
            ensure(
                w.is_finite() && w >= 0.0,
                &format!("{name} must be a non-negative number, got {w}"),
            )?;
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fetch.max_attempts,
            transient_delay: secs(self.fetch.transient_delay_secs),
            backoff_base: secs(self.fetch.backoff_base_secs),
            jitter_min: secs(self.fetch.jitter_min_secs),
            jitter_max: secs(self.fetch.jitter_max_secs),
        }
    }

    /// Batch settings; per-ticker fetches share the `[fetch]` attempt budget.
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch.batch_size,
            inter_batch_delay: secs(self.batch.inter_batch_delay_secs),
            prefer_bulk: self.batch.prefer_bulk,
            ticker_delay_min: secs(self.batch.ticker_delay_min_secs),
            ticker_delay_max: secs(self.batch.ticker_delay_max_secs),
            max_attempts: self.fetch.max_attempts,
        }
    }

    pub fn scoring_window(&self) -> ScoringWindow {
        self.scoring
    }

    pub fn grade_weights(&self) -> GradeWeights {
        self.grade
    }
}

fn ensure(cond: bool, msg: &str) -> Result<(), ConfigError> {
    if cond {
        Ok(())
    } else {
        Err(ConfigError::Invalid(msg.to_string()))
    }
}

/// Seconds to `Duration`; negative or non-finite input becomes zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
