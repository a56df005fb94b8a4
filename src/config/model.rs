// src/config/model.rs

use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 100_000;
pub const DEFAULT_MAX_DATABASE_SIZE_MB: u32 = 10;

pub const BYTES_PER_MB: u64 = 1_048_576;
pub const MAX_SUPPORTED_PAGES: u64 = 5_242_880;
pub const MAX_SUPPORTED_PAGE_SIZE: u64 = 4096;
/// Largest database the page configuration can address, in MB.
pub const MAX_SUPPORTED_DATABASE_SIZE_MB: u64 =
    MAX_SUPPORTED_PAGES * MAX_SUPPORTED_PAGE_SIZE / BYTES_PER_MB;

pub const RETENTION_CHECK_STEP: Duration = Duration::from_secs(15 * 60);
pub const MIN_RETENTION_PERIOD: Duration = Duration::from_secs(30 * 60);

/// Top-level runtime config of the binary
#[derive(Debug)]
pub struct Config {
    pub logging: LoggingConfig,
    pub sink: StoreConfig,
}

/// Mirror of the whole TOML file
#[derive(Debug, Deserialize)]
pub(crate) struct RawConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub sink: SinkSettings,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]            pub enable: bool,
    #[serde(default)]            pub file:   Option<String>,
    #[serde(default = "default_level")] pub level: String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Mirror of the `[sink]` table. Durations are humantime strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub path:                     String,
    pub table_name:               String,
    pub batch_size:               usize,
    pub max_buffer_size:          usize,
    pub max_database_size_mb:     u32,
    pub roll_over:                bool,
    pub store_timestamp_in_utc:   bool,
    pub retention_period:         Option<String>,
    pub retention_check_interval: Option<String>,
    pub flush_period:             String,
    pub auto_create_table:        bool,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            path:                     "logs.db".into(),
            table_name:               "Logs".into(),
            batch_size:               DEFAULT_BATCH_SIZE,
            max_buffer_size:          DEFAULT_MAX_BUFFER_SIZE,
            max_database_size_mb:     DEFAULT_MAX_DATABASE_SIZE_MB,
            roll_over:                true,
            store_timestamp_in_utc:   false,
            retention_period:         None,
            retention_check_interval: None,
            flush_period:             "2s".into(),
            auto_create_table:        false,
        }
    }
}

/// Retention policy after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Rows older than this are deleted; at least 30 minutes.
    pub period: Duration,
    /// Sweep cadence; a multiple of 15 minutes, at least 15 minutes.
    pub check_interval: Duration,
}

impl Retention {
    pub fn clamped(period: Duration, check_interval: Option<Duration>) -> Self {
        let step = RETENTION_CHECK_STEP.as_secs();
        let requested = check_interval.map_or(step, |d| d.as_secs()).max(step);
        Self {
            period: period.max(MIN_RETENTION_PERIOD),
            check_interval: Duration::from_secs(requested / step * step),
        }
    }
}

/// Validated, immutable store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    path:                   PathBuf,
    table_name:             String,
    batch_size:             usize,
    max_buffer_size:        usize,
    max_database_size_mb:   u32,
    roll_over:              bool,
    store_timestamp_in_utc: bool,
    retention:              Option<Retention>,
    flush_period:           Duration,
    auto_create_table:      bool,
}

impl StoreConfig {
    pub fn from_settings(s: SinkSettings) -> Result<Self, ConfigError> {
        if u64::from(s.max_database_size_mb) > MAX_SUPPORTED_DATABASE_SIZE_MB {
            return Err(ConfigError::DatabaseTooLarge {
                requested: s.max_database_size_mb,
                max: MAX_SUPPORTED_DATABASE_SIZE_MB,
            });
        }
        if s.max_database_size_mb == 0 {
            return Err(ConfigError::ZeroDatabaseSize);
        }
        if !is_identifier(&s.table_name) {
            return Err(ConfigError::InvalidTableName(s.table_name));
        }
        if s.batch_size == 0 || s.max_buffer_size < s.batch_size {
            return Err(ConfigError::InvalidBatching {
                batch_size: s.batch_size,
                max_buffer_size: s.max_buffer_size,
            });
        }

        let retention = match s.retention_period.as_deref() {
            Some(period) => {
                let period = parse_duration(period)?;
                let check = s.retention_check_interval.as_deref().map(parse_duration).transpose()?;
                Some(Retention::clamped(period, check))
            }
            None => None,
        };
        let flush_period = parse_duration(&s.flush_period)?;
        if flush_period.is_zero() {
            return Err(ConfigError::ZeroFlushPeriod);
        }

        Ok(Self {
            path: PathBuf::from(s.path),
            table_name: s.table_name,
            batch_size: s.batch_size,
            max_buffer_size: s.max_buffer_size,
            max_database_size_mb: s.max_database_size_mb,
            roll_over: s.roll_over,
            store_timestamp_in_utc: s.store_timestamp_in_utc,
            retention,
            flush_period,
            auto_create_table: s.auto_create_table,
        })
    }

    pub fn path(&self) -> &std::path::Path { &self.path }
    pub fn table_name(&self) -> &str { &self.table_name }
    pub fn batch_size(&self) -> usize { self.batch_size }
    pub fn max_buffer_size(&self) -> usize { self.max_buffer_size }
    pub fn max_database_size_mb(&self) -> u32 { self.max_database_size_mb }
    pub fn roll_over(&self) -> bool { self.roll_over }
    pub fn store_timestamp_in_utc(&self) -> bool { self.store_timestamp_in_utc }
    pub fn retention(&self) -> Option<Retention> { self.retention }
    pub fn flush_period(&self) -> Duration { self.flush_period }
    pub fn auto_create_table(&self) -> bool { self.auto_create_table }
}

fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(s).map_err(|e| ConfigError::InvalidDuration(s.into(), e))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// All the ways building a config can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("database size greater than {max} MB is not supported (requested {requested} MB)")]
    DatabaseTooLarge { requested: u32, max: u64 },

    #[error("max database size must be at least 1 MB")]
    ZeroDatabaseSize,

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("invalid batching: batch_size={batch_size}, max_buffer_size={max_buffer_size}")]
    InvalidBatching { batch_size: usize, max_buffer_size: usize },

    #[error("flush period must be greater than zero")]
    ZeroFlushPeriod,

    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u64 = 60;

    #[test]
    fn ceiling_is_twenty_gigabytes() {
        assert_eq!(MAX_SUPPORTED_DATABASE_SIZE_MB, 20_480);
        let s = SinkSettings { max_database_size_mb: 20_481, ..Default::default() };
        assert!(matches!(
            StoreConfig::from_settings(s),
            Err(ConfigError::DatabaseTooLarge { requested: 20_481, .. })
        ));
        let s = SinkSettings { max_database_size_mb: 20_480, ..Default::default() };
        assert!(StoreConfig::from_settings(s).is_ok());
    }

    #[test]
    fn zero_flush_period_is_rejected() {
        for zero in ["0s", "0ms"] {
            let s = SinkSettings { flush_period: zero.into(), ..Default::default() };
            assert!(matches!(StoreConfig::from_settings(s), Err(ConfigError::ZeroFlushPeriod)), "{zero}");
        }
        let s = SinkSettings { flush_period: "1ms".into(), ..Default::default() };
        assert_eq!(StoreConfig::from_settings(s).unwrap().flush_period(), Duration::from_millis(1));
    }

    #[test]
    fn retention_is_clamped() {
        let r = Retention::clamped(Duration::from_secs(5 * MIN), None);
        assert_eq!(r.period, Duration::from_secs(30 * MIN));
        assert_eq!(r.check_interval, Duration::from_secs(15 * MIN));

        let r = Retention::clamped(Duration::from_secs(600 * MIN), Some(Duration::from_secs(44 * MIN)));
        assert_eq!(r.period, Duration::from_secs(600 * MIN));
        assert_eq!(r.check_interval, Duration::from_secs(30 * MIN));

        let r = Retention::clamped(Duration::from_secs(600 * MIN), Some(Duration::from_secs(90 * MIN)));
        assert_eq!(r.check_interval, Duration::from_secs(90 * MIN));

        let r = Retention::clamped(Duration::from_secs(600 * MIN), Some(Duration::from_secs(MIN)));
        assert_eq!(r.check_interval, Duration::from_secs(15 * MIN));
    }

    #[test]
    fn rejects_unsafe_table_names() {
        for bad in ["", "1abc", "Logs; DROP TABLE x", "a-b"] {
            let s = SinkSettings { table_name: bad.into(), ..Default::default() };
            assert!(matches!(StoreConfig::from_settings(s), Err(ConfigError::InvalidTableName(_))), "{bad}");
        }
        let s = SinkSettings { table_name: "_app_logs2".into(), ..Default::default() };
        assert!(StoreConfig::from_settings(s).is_ok());
    }

    #[test]
    fn parses_humantime_durations() {
        let s = SinkSettings {
            retention_period: Some("7days".into()),
            retention_check_interval: Some("1h".into()),
            ..Default::default()
        };
        let cfg = StoreConfig::from_settings(s).unwrap();
        let r = cfg.retention().unwrap();
        assert_eq!(r.period, Duration::from_secs(7 * 24 * 60 * MIN));
        assert_eq!(r.check_interval, Duration::from_secs(60 * MIN));

        let s = SinkSettings { retention_period: Some("soon".into()), ..Default::default() };
        assert!(matches!(StoreConfig::from_settings(s), Err(ConfigError::InvalidDuration(..))));
    }
}
