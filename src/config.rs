//! Configuration management

use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bucketing: BucketingConfig,
    pub quality: QualityConfig,
    pub correlation: CorrelationConfig,
    pub regression: RegressionConfig,
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BucketingConfig {
    /// Run interval of the upstream sentiment pipeline, used as the 1d bucket width
    pub pipeline_cadence_minutes: u32,
    /// Bucket width for every window longer than one day
    pub long_window_bucket_minutes: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Below this many pairs correlation is not computed
    pub min_sample_size: usize,
    /// Below this many pairs the result is flagged "limited sample"
    pub limited_sample_threshold: usize,
    /// Minimum max-min spread of sentiment values
    pub sentiment_range_epsilon: f64,
    /// Minimum max-min spread of price values
    pub price_range_epsilon: f64,
    /// Below this many distinct UTC days the result is flagged "short time span"
    pub min_distinct_days: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Critical z value for the Fisher interval (1.96 = 95%)
    pub confidence_z: f64,
    /// Two-tailed p-value cutoff behind `CorrelationResult::significant`
    pub significance_alpha: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// OLS denominators below this are treated as collinear-in-x
    pub denominator_epsilon: f64,
}

/// One year
pub const MAX_CACHE_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memoize results keyed by (symbol, window, input hash)
    pub enabled: bool,
    /// Entry lifetime in seconds
    pub ttl_secs: i64,
    /// Upper bound on live entries
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Directory the JSON file provider reads observation arrays from
    pub data_dir: String,
    /// Timeout around fetch + compute, in seconds
    pub timeout_secs: u64,
}

impl EngineConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("SENTIMENT_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations, falling back to built-in defaults
    pub fn load_default() -> anyhow::Result<Self> {
        let paths = [
            "sentiment-engine.toml",
            "sentiment-engine.yaml",
            "~/.config/sentiment-engine/config.toml",
        ];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }

        tracing::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Reject settings that would make bucketing or statistics degenerate
    pub fn validate(&self) -> Result<()> {
        if self.bucketing.pipeline_cadence_minutes == 0 {
            return Err(EngineError::Config(
                "bucketing.pipeline_cadence_minutes must be > 0".to_string(),
            ));
        }
        if self.bucketing.long_window_bucket_minutes == 0 {
            return Err(EngineError::Config(
                "bucketing.long_window_bucket_minutes must be > 0".to_string(),
            ));
        }
        if self.quality.min_sample_size < 3 {
            return Err(EngineError::Config(
                "quality.min_sample_size must be at least 3".to_string(),
            ));
        }
        if !(self.quality.sentiment_range_epsilon > 0.0 && self.quality.price_range_epsilon > 0.0) {
            return Err(EngineError::Config(
                "quality range epsilons must be > 0".to_string(),
            ));
        }
        if !(self.correlation.confidence_z > 0.0) {
            return Err(EngineError::Config(
                "correlation.confidence_z must be > 0".to_string(),
            ));
        }
        if !(self.correlation.significance_alpha > 0.0 && self.correlation.significance_alpha < 1.0) {
            return Err(EngineError::Config(
                "correlation.significance_alpha must be in (0, 1)".to_string(),
            ));
        }
        if !(0..=MAX_CACHE_TTL_SECS).contains(&self.cache.ttl_secs) {
            return Err(EngineError::Config(format!(
                "cache.ttl_secs must be between 0 and {}",
                MAX_CACHE_TTL_SECS
            )));
        }
        if !(self.regression.denominator_epsilon > 0.0) {
            return Err(EngineError::Config(
                "regression.denominator_epsilon must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BucketingConfig {
    fn default() -> Self {
        Self {
            pipeline_cadence_minutes: 45,
            long_window_bucket_minutes: 60,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 3,
            limited_sample_threshold: 10,
            sentiment_range_epsilon: 0.01,
            price_range_epsilon: 0.01,
            min_distinct_days: 3,
        }
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            confidence_z: 1.96,
            significance_alpha: 0.05,
        }
    }
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            denominator_epsilon: 1e-12,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 300,
            max_entries: 256,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            timeout_secs: 10,
        }
    }
}
