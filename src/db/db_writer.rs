// src/db/db_writer.rs

use std::{path::PathBuf, sync::Arc, time::Instant};
use async_trait::async_trait;
use log::Level;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::db::{
    batch_inserts::insert_batch,
    connection::{ensure_schema, is_storage_full, open_db_connection, DbError},
    rollover::{rollover, RolloverError},
    WriteGate,
};
use crate::record::LogRecord;
use crate::sink_log;

/// What happened to a batch that was handled without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing to write.
    Empty,
    /// All rows committed.
    Committed(usize),
    /// The file was full and rollover is disabled: the rows were dropped on
    /// purpose. Callers see success so the batch is not retried forever.
    Discarded(usize),
    /// The file was full, was backed up to `backup` and emptied, and the rows
    /// were committed on the single retry.
    RolledOver { rows: usize, backup: PathBuf },
}

impl BatchOutcome {
    /// Rows that are now in the live table because of this batch.
    pub fn rows_written(&self) -> usize {
        match self {
            BatchOutcome::Committed(n) => *n,
            BatchOutcome::RolledOver { rows, .. } => *rows,
            BatchOutcome::Empty | BatchOutcome::Discarded(_) => 0,
        }
    }
}

/// A failed batch. Every variant except `RetryAfterRollover` means "retry
/// this batch later".
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("rollover failed: {0}")]
    Rollover(#[from] RolloverError),

    #[error("retry after rollover failed: {0}")]
    RetryAfterRollover(#[source] rusqlite::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl WriteError {
    /// `false` when resending the same batch cannot succeed: it did not fit
    /// even in a freshly emptied file.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, WriteError::RetryAfterRollover(_))
    }
}

/// Destination of batches produced by the upstream queue.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn write(&self, batch: Arc<[LogRecord]>) -> Result<BatchOutcome, WriteError>;
}

/// Serialized batch writer. Each call holds the write gate for the whole
/// unit of work: open, insert, (rollover, retry), close.
#[derive(Clone)]
pub struct BatchWriter {
    config: Arc<StoreConfig>,
    gate: WriteGate,
}

impl BatchWriter {
    pub fn new(config: Arc<StoreConfig>, gate: WriteGate) -> Self {
        Self { config, gate }
    }

    /// Write one batch in order, in one transaction.
    ///
    /// `Ok` means the batch is handled (see `BatchOutcome::Discarded` for the
    /// one case where handled does not mean stored). `Err` has already been
    /// logged and means the caller should retry the batch later.
    pub async fn write(&self, batch: Arc<[LogRecord]>) -> Result<BatchOutcome, WriteError> {
        if batch.is_empty() {
            return Ok(BatchOutcome::Empty);
        }
        let rows = batch.len();
        let pass = self.gate.acquire().await;
        let config = Arc::clone(&self.config);
        let start = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            let _pass = pass;
            write_blocking(&config, &batch)
        })
        .await
        .map_err(WriteError::from)
        .and_then(|r| r);

        match &result {
            Ok(outcome) => {
                metrics::counter!("logsink_rows_written_total").increment(outcome.rows_written() as u64);
                sink_log!(
                    Level::Debug,
                    "writer",
                    "Batch of {} rows handled in {:?}: {:?}",
                    rows,
                    start.elapsed(),
                    outcome
                );
            }
            Err(e) => {
                metrics::counter!("logsink_batches_failed_total").increment(1);
                sink_log!(Level::Error, "writer", "Batch of {} rows failed: {}", rows, e);
            }
        }
        result
    }
}

#[async_trait]
impl BatchSink for BatchWriter {
    async fn write(&self, batch: Arc<[LogRecord]>) -> Result<BatchOutcome, WriteError> {
        BatchWriter::write(self, batch).await
    }
}

/// Body of a write; runs on a blocking thread with the gate held.
fn write_blocking(config: &StoreConfig, batch: &[LogRecord]) -> Result<BatchOutcome, WriteError> {
    let path = config.path();
    let table = config.table_name();
    let mut conn = open_db_connection(path, config.max_database_size_mb())?;
    ensure_schema(&conn, table)?;

    match insert_batch(&mut conn, table, batch) {
        Ok(()) => Ok(BatchOutcome::Committed(batch.len())),
        Err(e) if is_storage_full(&e) => {
            sink_log!(Level::Warn, "writer", "{}: {}", path.display(), e);

            if !config.roll_over() {
                sink_log!(
                    Level::Warn,
                    "writer",
                    "Discarding {} rows in excess of max database size",
                    batch.len()
                );
                metrics::counter!("logsink_rows_discarded_total").increment(batch.len() as u64);
                return Ok(BatchOutcome::Discarded(batch.len()));
            }

            let backup = rollover(&conn, path, table)?;
            insert_batch(&mut conn, table, batch).map_err(WriteError::RetryAfterRollover)?;
            Ok(BatchOutcome::RolledOver { rows: batch.len(), backup })
        }
        Err(e) => Err(WriteError::Sql(e)),
    }
}
