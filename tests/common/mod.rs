// tests/common/mod.rs
#![allow(dead_code)]

use std::{path::{Path, PathBuf}, sync::Arc};
use chrono::{DateTime, FixedOffset, Local, TimeDelta};
use rusqlite::Connection;
use tempfile::TempDir;

use logsink::{encode, Level, LogEvent, LogRecord, SinkSettings, StoreConfig};

/// Scratch directory plus the database path inside it.
pub fn scratch_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("logs.db");
    (dir, db)
}

pub fn settings(db: &Path) -> SinkSettings {
    SinkSettings {
        path: db.to_string_lossy().into_owned(),
        ..Default::default()
    }
}

pub fn store_config(settings: SinkSettings) -> Arc<StoreConfig> {
    Arc::new(StoreConfig::from_settings(settings).expect("valid settings"))
}

pub fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

pub fn hours_ago(h: i64) -> DateTime<FixedOffset> {
    now() - TimeDelta::hours(h)
}

/// `n` small records tagged with `tag` in the UserName column, in order.
pub fn tagged_records(tag: &str, n: usize) -> Vec<LogRecord> {
    (0..n)
        .map(|i| {
            let ev = LogEvent::new(Level::Information, "{UserName} step {Step}")
                .with_property("UserName", tag)
                .with_property("Step", i as u64);
            encode(&ev, false)
        })
        .collect()
}

pub fn records_at(ts: DateTime<FixedOffset>, n: usize, utc: bool) -> Vec<LogRecord> {
    (0..n)
        .map(|i| encode(&LogEvent::new(Level::Debug, format!("row {i}")).at(ts), utc))
        .collect()
}

/// Roughly 30 KB per row once message, template and JSON are stored.
pub fn bulky_records(tag: &str, n: usize) -> Vec<LogRecord> {
    let filler = "x".repeat(10_000);
    (0..n)
        .map(|_| {
            let ev = LogEvent::new(Level::Warning, filler.clone()).with_property("UserName", tag);
            encode(&ev, false)
        })
        .collect()
}

pub fn count_rows(db: &Path, table: &str) -> i64 {
    let conn = Connection::open(db).expect("open for count");
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))
        .expect("count rows")
}

pub fn count_tagged(db: &Path, table: &str, tag: &str) -> i64 {
    let conn = Connection::open(db).expect("open for count");
    conn.query_row(
        &format!("SELECT COUNT(*) FROM \"{table}\" WHERE UserName = ?1"),
        [tag],
        |r| r.get(0),
    )
    .expect("count tagged rows")
}
