//! Run Configuration
//!
//! Loaded from an optional TOML file overlaid with `ALERTMAGNET_*`
//! environment variables, then validated before anything is fetched.

use crate::logging::{self, LoggingConfig};
use ::config::{Config, Environment, File};
use alert_model::Timestamp;
use dependency_analyzer::AnalyzerPolicy;
use firing_intervals::NormalizerConfig;
use query_engine::{BackoffPolicy, ExecutorConfig, QueryParams, SplitError, SplitPlan};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const ENV_PREFIX: &str = "ALERTMAGNET";

/// Configuration errors, all fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("api_endpoint is required")]
    MissingEndpoint,

    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Invalid duration {0:?}: expected e.g. 90d, 1y or 2w3d")]
    InvalidDuration(String),
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

fn default_query() -> String {
    query_engine::DEFAULT_SELECTOR.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_delay_seconds() -> f64 {
    0.25
}

fn default_max_threads() -> usize {
    12
}

fn default_max_long_term_storage() -> String {
    "1y".to_string()
}

fn default_min_overlap_ratio() -> f64 {
    0.9
}

fn default_min_samples() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_recent_chunk_hours() -> u64 {
    24
}

fn default_downsampled_chunk_days() -> u64 {
    7
}

fn default_recent_step_seconds() -> u64 {
    60
}

fn default_downsampled_step_seconds() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn default_engine() -> Option<String> {
    Some("thanos".to_string())
}

fn default_partition_label() -> Option<String> {
    Some("cluster".to_string())
}

fn default_max_failed_ratio() -> f64 {
    0.5
}

fn default_directory_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_naptime_seconds() -> u64 {
    86_400
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

/// Everything one run needs, passed by value into the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnetConfig {
    /// Base URL of the Prometheus/Thanos API
    #[serde(default)]
    pub api_endpoint: String,
    /// Series selector
    #[serde(default = "default_query")]
    pub query: String,
    /// Age (days) after which the backend serves downsampled data
    #[serde(default)]
    pub threshold_days: Option<u64>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Pause between request starts of one worker
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: f64,
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// History depth as a Prometheus duration, e.g. `1y`
    #[serde(default = "default_max_long_term_storage")]
    pub max_long_term_storage: String,
    #[serde(default = "default_min_overlap_ratio")]
    pub min_overlap_ratio: f64,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Chunk width for full-resolution history
    #[serde(default = "default_recent_chunk_hours")]
    pub recent_chunk_hours: u64,
    /// Chunk width for downsampled history
    #[serde(default = "default_downsampled_chunk_days")]
    pub downsampled_chunk_days: u64,
    #[serde(default = "default_recent_step_seconds")]
    pub recent_step_seconds: u64,
    #[serde(default = "default_downsampled_step_seconds")]
    pub downsampled_step_seconds: u64,
    #[serde(default = "default_true")]
    pub dedup: bool,
    #[serde(default)]
    pub partial_response: bool,
    #[serde(default = "default_engine")]
    pub engine: Option<String>,
    /// Defaults to the recent step
    #[serde(default)]
    pub gap_tolerance_seconds: Option<i64>,
    /// Label scoping co-occurrence; empty for global
    #[serde(default = "default_partition_label")]
    pub partition_label: Option<String>,
    /// Share of failed ranges above which a run counts as failed
    #[serde(default = "default_max_failed_ratio")]
    pub max_failed_ratio: f64,
    /// Root of the per-run result directories
    #[serde(default = "default_directory_path")]
    pub directory_path: PathBuf,
    /// Metrics exporter port; disabled when unset
    #[serde(default)]
    pub prometheus_port: Option<u16>,
    /// Pause between runs; 0 runs once
    #[serde(default = "default_naptime_seconds")]
    pub naptime_seconds: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub log_to_file: bool,
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
}

impl MagnetConfig {
    /// Defaults for everything but the endpoint
    pub fn new(api_endpoint: impl Into<String>) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            query: default_query(),
            threshold_days: None,
            timeout_seconds: default_timeout_seconds(),
            delay_seconds: default_delay_seconds(),
            max_threads: default_max_threads(),
            max_long_term_storage: default_max_long_term_storage(),
            min_overlap_ratio: default_min_overlap_ratio(),
            min_samples: default_min_samples(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            recent_chunk_hours: default_recent_chunk_hours(),
            downsampled_chunk_days: default_downsampled_chunk_days(),
            recent_step_seconds: default_recent_step_seconds(),
            downsampled_step_seconds: default_downsampled_step_seconds(),
            dedup: true,
            partial_response: false,
            engine: default_engine(),
            gap_tolerance_seconds: None,
            partition_label: default_partition_label(),
            max_failed_ratio: default_max_failed_ratio(),
            directory_path: default_directory_path(),
            prometheus_port: None,
            naptime_seconds: default_naptime_seconds(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_to_file: false,
            log_directory: default_log_directory(),
        }
    }

    /// Load from `path` (if any) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Reject settings no run can succeed with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if self.query.trim().is_empty() {
            return Err(invalid("query", "must not be empty"));
        }
        if self.max_threads == 0 {
            return Err(invalid("max_threads", "must be at least 1"));
        }
        if self.timeout_seconds == 0 {
            return Err(invalid("timeout_seconds", "must be at least 1"));
        }
        if !self.delay_seconds.is_finite() || self.delay_seconds < 0.0 {
            return Err(invalid("delay_seconds", format!("{} is not a non-negative number", self.delay_seconds)));
        }
        if !(self.min_overlap_ratio > 0.0 && self.min_overlap_ratio <= 1.0) {
            return Err(invalid("min_overlap_ratio", format!("{} is outside (0, 1]", self.min_overlap_ratio)));
        }
        if !(0.0..=1.0).contains(&self.max_failed_ratio) {
            return Err(invalid("max_failed_ratio", format!("{} is outside [0, 1]", self.max_failed_ratio)));
        }
        if self.backoff_base_ms > self.backoff_cap_ms {
            return Err(invalid("backoff_base_ms", "must not exceed backoff_cap_ms"));
        }
        for (key, value) in [
            ("recent_chunk_hours", self.recent_chunk_hours),
            ("downsampled_chunk_days", self.downsampled_chunk_days),
            ("recent_step_seconds", self.recent_step_seconds),
            ("downsampled_step_seconds", self.downsampled_step_seconds),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be at least 1"));
            }
        }
        if matches!(self.gap_tolerance_seconds, Some(tolerance) if tolerance < 1) {
            return Err(invalid("gap_tolerance_seconds", "must be at least 1"));
        }
        if self.history()? < Duration::from_secs(1) {
            return Err(invalid("max_long_term_storage", "must be at least 1s"));
        }
        logging::parse_level(&self.log_level).map_err(|e| invalid("log_level", e.to_string()))?;
        logging::resolve_format(&self.log_format).map_err(|e| invalid("log_format", e.to_string()))?;
        Ok(())
    }

    /// History depth
    pub fn history(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.max_long_term_storage)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_seconds).unwrap_or_default()
    }

    pub fn threshold(&self) -> Option<Duration> {
        self.threshold_days.map(|days| Duration::from_secs(days.saturating_mul(86_400)))
    }

    /// Gap tolerance for full-resolution samples
    pub fn gap_tolerance(&self) -> i64 {
        self.gap_tolerance_seconds
            .unwrap_or(self.recent_step_seconds as i64)
    }

    pub fn split_plan(&self, now: Timestamp) -> Result<SplitPlan, SplitError> {
        SplitPlan::new(
            now,
            self.threshold(),
            Duration::from_secs(self.downsampled_chunk_days.saturating_mul(86_400)),
            Duration::from_secs(self.recent_chunk_hours.saturating_mul(3600)),
        )
    }

    pub fn query_params(&self) -> QueryParams {
        QueryParams {
            recent_step_secs: self.recent_step_seconds,
            downsampled_step_secs: self.downsampled_step_seconds,
            dedup: self.dedup,
            partial_response: self.partial_response,
            engine: self.engine.clone().filter(|engine| !engine.is_empty()),
            ..QueryParams::default()
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            concurrency: self.max_threads,
            delay: self.delay(),
            timeout: self.timeout(),
            max_retries: self.max_retries,
            backoff: BackoffPolicy::new(
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_cap_ms),
            ),
            min_split_width: 2 * self.recent_step_seconds as i64,
        }
    }

    /// Normalizer settings for full-resolution and downsampled samples
    pub fn normalizer_configs(&self) -> Result<(NormalizerConfig, NormalizerConfig), ConfigError> {
        let recent = self.gap_tolerance();
        let downsampled = recent.max(self.downsampled_step_seconds as i64);
        let build = |tolerance| {
            NormalizerConfig::new(tolerance).map_err(|e| invalid("gap_tolerance_seconds", e.to_string()))
        };
        Ok((build(recent)?, build(downsampled)?))
    }

    pub fn analyzer_policy(&self) -> AnalyzerPolicy {
        AnalyzerPolicy::new(self.min_overlap_ratio, self.min_samples)
            .with_sample_step(self.recent_step_seconds as i64)
            .with_partition_label(self.partition_label.clone())
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format.clone(),
            to_file: self.log_to_file,
            directory: self.log_directory.clone(),
        }
    }
}

/// Parse a Prometheus duration such as `90d`, `1y` or `1w2d12h`
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let err = || ConfigError::InvalidDuration(text.to_string());
    let mut chars = text.trim().chars().peekable();
    let mut total_ms: u64 = 0;
    let mut parsed_any = false;

    while chars.peek().is_some() {
        let mut value: u64 = 0;
        let mut digits = 0;
        while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit)))
                .ok_or_else(err)?;
            digits += 1;
            chars.next();
        }
        if digits == 0 {
            return Err(err());
        }

        let unit_ms: u64 = match chars.next() {
            Some('m') if chars.peek() == Some(&'s') => {
                chars.next();
                1
            }
            Some('s') => 1_000,
            Some('m') => 60_000,
            Some('h') => 3_600_000,
            Some('d') => 86_400_000,
            Some('w') => 7 * 86_400_000,
            Some('y') => 365 * 86_400_000,
            _ => return Err(err()),
        };
        total_ms = value
            .checked_mul(unit_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(err)?;
        parsed_any = true;
    }

    if !parsed_any {
        return Err(err());
    }
    Ok(Duration::from_millis(total_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90d").unwrap(), Duration::from_secs(90 * 86_400));
        assert_eq!(parse_duration("1y").unwrap(), Duration::from_secs(365 * 86_400));
        assert_eq!(
            parse_duration("1w2d12h").unwrap(),
            Duration::from_secs(9 * 86_400 + 12 * 3600)
        );
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for text in ["", "d", "10", "5x", "1.5h", "99999999999999999999y"] {
            assert!(
                matches!(parse_duration(text), Err(ConfigError::InvalidDuration(_))),
                "{:?} should be rejected",
                text
            );
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = MagnetConfig::new("http://localhost:9090");
        config.validate().unwrap();
        assert_eq!(config.gap_tolerance(), 60);
        assert_eq!(config.executor_config().min_split_width, 120);
        assert_eq!(config.delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_validation_failures() {
        assert!(matches!(MagnetConfig::new(" ").validate(), Err(ConfigError::MissingEndpoint)));

        let cases: [(&str, fn(&mut MagnetConfig)); 9] = [
            ("max_threads", |c: &mut MagnetConfig| c.max_threads = 0),
            ("timeout_seconds", |c: &mut MagnetConfig| c.timeout_seconds = 0),
            ("delay_seconds", |c: &mut MagnetConfig| c.delay_seconds = -1.0),
            ("min_overlap_ratio", |c: &mut MagnetConfig| c.min_overlap_ratio = 0.0),
            ("max_failed_ratio", |c: &mut MagnetConfig| c.max_failed_ratio = 1.5),
            ("recent_chunk_hours", |c: &mut MagnetConfig| c.recent_chunk_hours = 0),
            ("gap_tolerance_seconds", |c: &mut MagnetConfig| c.gap_tolerance_seconds = Some(0)),
            ("log_level", |c: &mut MagnetConfig| c.log_level = "LOUD".to_string()),
            ("log_format", |c: &mut MagnetConfig| c.log_format = "xml".to_string()),
        ];
        for (expected, mutate) in cases {
            let mut config = MagnetConfig::new("http://localhost:9090");
            mutate(&mut config);
            match config.validate() {
                Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, expected),
                other => panic!("{}: expected invalid, got {:?}", expected, other),
            }
        }

        let mut config = MagnetConfig::new("http://localhost:9090");
        config.max_long_term_storage = "forever".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alertmagnet.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
api_endpoint = "https://thanos.example.com"
threshold_days = 30
max_threads = 4
max_long_term_storage = "90d"
partition_label = "namespace"
"#
        )
        .unwrap();

        let config = MagnetConfig::load(Some(&path)).unwrap();
        assert_eq!(config.api_endpoint, "https://thanos.example.com");
        assert_eq!(config.threshold_days, Some(30));
        assert_eq!(config.max_threads, 4);
        assert_eq!(config.history().unwrap(), Duration::from_secs(90 * 86_400));
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.analyzer_policy().partition_label.as_deref(), Some("namespace"));
        config.validate().unwrap();
    }

    #[test]
    fn test_downsampled_tolerance_follows_step() {
        let config = MagnetConfig::new("http://localhost:9090");
        let (recent, downsampled) = config.normalizer_configs().unwrap();
        assert_eq!(recent.gap_tolerance, 60);
        assert_eq!(downsampled.gap_tolerance, 3600);
    }
}
