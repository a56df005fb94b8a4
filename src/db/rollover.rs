// src/db/rollover.rs
//! Backup-then-truncate rollover of a full database file.

use std::{fs, path::{Path, PathBuf}};
use chrono::{DateTime, Local, Timelike};
use rusqlite::Connection;
use thiserror::Error;
use log::Level;
use crate::sink_log;

/// Directory used when the database path has no directory component.
pub const FALLBACK_DIR: &str = "Logs";

#[derive(Debug, Error)]
pub enum RolloverError {
    #[error("WAL checkpoint before backup failed: {0}")]
    Checkpoint(#[source] rusqlite::Error),

    #[error("WAL checkpoint before backup was blocked by another connection")]
    CheckpointBusy,

    #[error("backup copy {from:?} -> {to:?} failed: {source}")]
    Backup {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("truncating live database failed: {0}")]
    Truncate(#[source] rusqlite::Error),
}

/// `<stem>-<yyyyMMdd_HHmmss.ff><ext>` next to `path` (or under `Logs/`).
pub fn rollover_path(path: &Path, now: DateTime<Local>) -> PathBuf {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from(FALLBACK_DIR),
    };
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let hundredths = now.nanosecond() % 1_000_000_000 / 10_000_000;
    dir.join(format!("{stem}-{}.{hundredths:02}{ext}", now.format("%Y%m%d_%H%M%S")))
}

/// Copy the live file aside, then empty and compact it.
///
/// `conn` must be an open handle on `path` with no transaction in progress.
/// The copy happens before anything is deleted; if it fails the live file is
/// left as it was. Returns the backup path.
pub fn rollover(conn: &Connection, path: &Path, table: &str) -> Result<PathBuf, RolloverError> {
    // Fold the WAL into the main file so the copy holds every committed row.
    let busy: i64 = conn
        .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |r| r.get(0))
        .map_err(RolloverError::Checkpoint)?;
    if busy != 0 {
        return Err(RolloverError::CheckpointBusy);
    }

    let backup = rollover_path(path, Local::now());
    if let Some(dir) = backup.parent() {
        fs::create_dir_all(dir).map_err(|source| RolloverError::Backup {
            from: path.to_path_buf(),
            to: backup.clone(),
            source,
        })?;
    }
    fs::copy(path, &backup).map_err(|source| RolloverError::Backup {
        from: path.to_path_buf(),
        to: backup.clone(),
        source,
    })?;
    sink_log!(Level::Info, "rollover", "Copied {:?} to {:?}", path, backup);

    // VACUUM refuses to run while any statement is still prepared.
    conn.flush_prepared_statement_cache();
    conn.execute(&format!("DELETE FROM \"{table}\""), [])
        .map_err(RolloverError::Truncate)?;
    conn.execute_batch("VACUUM").map_err(RolloverError::Truncate)?;

    sink_log!(Level::Info, "rollover", "Rolling database to {:?}", backup);
    metrics::counter!("logsink_rollovers_total").increment(1);
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 7, 9, 8, 5, 3)
            .unwrap()
            .with_nanosecond(456_000_000)
            .unwrap()
    }

    #[test]
    fn backup_name_embeds_timestamp() {
        let p = rollover_path(Path::new("/var/log/app/logs.db"), fixed_now());
        assert_eq!(p, PathBuf::from("/var/log/app/logs-20240709_080503.45.db"));
    }

    #[test]
    fn bare_file_name_falls_back_to_logs_dir() {
        let p = rollover_path(Path::new("logs.sqlite"), fixed_now());
        assert_eq!(p, PathBuf::from("Logs/logs-20240709_080503.45.sqlite"));
    }

    #[test]
    fn missing_extension_is_kept_missing() {
        let p = rollover_path(Path::new("data/journal"), fixed_now());
        assert_eq!(p, PathBuf::from("data/journal-20240709_080503.45"));
    }
}
