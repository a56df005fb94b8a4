// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads the TOML config file, deserializes it and validates the `[sink]`
//! table into a `StoreConfig`.

use crate::sink_log;
use crate::config::model::{Config, ConfigError, RawConfig, StoreConfig};
use log::Level;
use std::{fs, path::Path};

/// Load and validate the configuration at `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    sink_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt)?;
    sink_log!(Level::Info, "config", "Loaded config from {:?}", path);
    Ok(cfg)
}

/// Parse and validate configuration text.
pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(txt)?;
    Ok(Config {
        logging: raw.logging,
        sink: StoreConfig::from_settings(raw.sink)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_full_file() {
        let cfg = parse(
            r#"
            [logging]
            enable = true
            file = "sink.log"
            level = "DEBUG"

            [sink]
            path = "data/app.db"
            table_name = "AppLogs"
            batch_size = 50
            max_database_size_mb = 64
            roll_over = false
            store_timestamp_in_utc = true
            retention_period = "2days"
            retention_check_interval = "30m"
            auto_create_table = true
            "#,
        )
        .unwrap();

        assert!(cfg.logging.enable);
        assert_eq!(cfg.logging.level, "DEBUG");
        assert_eq!(cfg.sink.path(), Path::new("data/app.db"));
        assert_eq!(cfg.sink.table_name(), "AppLogs");
        assert_eq!(cfg.sink.batch_size(), 50);
        assert_eq!(cfg.sink.max_buffer_size(), 100_000);
        assert_eq!(cfg.sink.max_database_size_mb(), 64);
        assert!(!cfg.sink.roll_over());
        assert!(cfg.sink.store_timestamp_in_utc());
        assert!(cfg.sink.auto_create_table());
        assert_eq!(cfg.sink.retention().unwrap().check_interval, Duration::from_secs(30 * 60));
        assert_eq!(cfg.sink.flush_period(), Duration::from_secs(2));
    }

    #[test]
    fn logging_table_is_optional() {
        let cfg = parse("[sink]\npath = \"x.db\"\n").unwrap();
        assert!(!cfg.logging.enable);
        assert_eq!(cfg.logging.level, "INFO");
        assert_eq!(cfg.sink.table_name(), "Logs");
        assert!(cfg.sink.retention().is_none());
    }

    #[test]
    fn oversize_database_is_fatal() {
        let err = parse("[sink]\nmax_database_size_mb = 30000\n").unwrap_err();
        assert!(matches!(err, ConfigError::DatabaseTooLarge { .. }));
    }
}
