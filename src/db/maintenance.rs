// src/db/maintenance.rs
//! Periodic retention cleanup.

use std::sync::Arc;
use chrono::{Local, TimeDelta, Utc};
use log::Level;
use rusqlite::Connection;
use tokio::{sync::oneshot, task::JoinHandle, time::MissedTickBehavior};

use crate::config::{Retention, StoreConfig};
use crate::db::{connection::{ensure_schema, open_db_connection, DbError}, WriteGate};
use crate::record::format_timestamp;
use crate::sink_log;

/// Deletes rows older than the retention period, on demand or on a timer.
#[derive(Clone)]
pub struct RetentionSweeper {
    config: Arc<StoreConfig>,
    retention: Retention,
    gate: WriteGate,
}

impl RetentionSweeper {
    /// `None` when the config has no retention period.
    pub fn new(config: Arc<StoreConfig>, gate: WriteGate) -> Option<Self> {
        let retention = config.retention()?;
        Some(Self { config, retention, gate })
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Formatted cutoff for a sweep starting now, in the column's clock.
    /// `None` if the period reaches before the representable range.
    pub fn cutoff(&self) -> Option<String> {
        let period = TimeDelta::from_std(self.retention.period).ok()?;
        if self.config.store_timestamp_in_utc() {
            Utc::now().checked_sub_signed(period).map(|t| format_timestamp(&t, true))
        } else {
            Local::now().checked_sub_signed(period).map(|t| format_timestamp(&t, false))
        }
    }

    /// One sweep: delete every row whose timestamp sorts before the cutoff.
    /// Returns the number of rows removed.
    pub async fn sweep(&self) -> Result<usize, DbError> {
        let Some(cutoff) = self.cutoff() else {
            return Ok(0);
        };
        let pass = self.gate.acquire().await;
        let config = Arc::clone(&self.config);

        let deleted = tokio::task::spawn_blocking(move || -> Result<usize, DbError> {
            let _pass = pass;
            let conn = open_db_connection(config.path(), config.max_database_size_mb())?;
            ensure_schema(&conn, config.table_name())?;
            sink_log!(Level::Debug, "retention", "Deleting log entries older than {}", cutoff);
            Ok(delete_older_than(&conn, config.table_name(), &cutoff)?)
        })
        .await??;

        sink_log!(Level::Info, "retention", "{} records deleted", deleted);
        metrics::counter!("logsink_rows_expired_total").increment(deleted as u64);
        Ok(deleted)
    }

    /// Start the periodic sweep: first run immediately, then every
    /// `check_interval`. Must be called inside a tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let period = self.retention.check_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            sink_log!(Level::Info, "retention", "Sweeper started (interval={:?}, retention={:?})", period, self.retention.period);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        // a failed sweep only skips this cycle
                        if let Err(e) = self.sweep().await {
                            sink_log!(Level::Warn, "retention", "Sweep failed: {}", e);
                        }
                    }
                }
            }
            sink_log!(Level::Info, "retention", "Sweeper stopped");
        });

        SweeperHandle { stop: Some(stop_tx), task }
    }
}

/// Teardown hook of a running sweeper. Dropping it also stops the timer.
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the timer and wait for an in-flight sweep to finish.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            sink_log!(Level::Warn, "retention", "Sweeper task ended abnormally: {}", e);
        }
    }
}

/// Lexicographic compare on the fixed-width timestamp text.
pub fn delete_older_than(conn: &Connection, table: &str, cutoff: &str) -> rusqlite::Result<usize> {
    conn.execute(&format!("DELETE FROM \"{table}\" WHERE TimeStamp < ?1"), [cutoff])
}
