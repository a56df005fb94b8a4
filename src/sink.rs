//! `SqliteSink`: queueing front end over the batch writer.
//!
//! Producers call `emit` from any task or thread. Events are encoded right
//! away and pushed onto a bounded queue; a single pump task drains the queue
//! into batches and hands them to a `BatchSink` one at a time.
//!
//! ## Backpressure
//! - the queue holds at most `max_buffer_size` records; `emit` drops the event
//!   when it is full
//! - a batch that fails is kept and retried on the next flush; while it is
//!   pending, the oldest queued records are dropped once the buffer is full
//! - a batch that still fails after a rollover is dropped, since it cannot
//!   fit even in an empty file

use std::{collections::VecDeque, sync::Arc, time::Duration};
use log::Level;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};

use crate::config::StoreConfig;
use crate::db::{
    connection::{init_database, DbError},
    BatchSink, BatchWriter, RetentionSweeper, SweeperHandle, WriteGate,
};
use crate::events::LogEvent;
use crate::record::{encode, LogRecord};
use crate::sink_log;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database initialisation failed: {0}")]
    Init(#[from] DbError),
}

/// A running log sink: queue, pump, writer and optional retention sweeper.
pub struct SqliteSink {
    config: Arc<StoreConfig>,
    writer: BatchWriter,
    tx: mpsc::Sender<LogRecord>,
    pump: JoinHandle<()>,
    sweeper: Option<SweeperHandle>,
}

impl SqliteSink {
    /// Build the sink and start its background tasks on the current runtime.
    pub async fn open(config: StoreConfig) -> Result<Self, SinkError> {
        let config = Arc::new(config);
        let gate = WriteGate::new();

        if config.auto_create_table() {
            let pass = gate.acquire().await;
            let cfg = Arc::clone(&config);
            tokio::task::spawn_blocking(move || {
                let _pass = pass;
                init_database(cfg.path(), cfg.table_name(), cfg.max_database_size_mb()).map(drop)
            })
            .await
            .map_err(DbError::from)??;
        }

        let writer = BatchWriter::new(Arc::clone(&config), gate.clone());
        let sweeper = RetentionSweeper::new(Arc::clone(&config), gate).map(RetentionSweeper::spawn);

        let (tx, rx) = mpsc::channel(config.max_buffer_size());
        let pump = Pump::new(Arc::new(writer.clone()), rx, &config);
        let pump = tokio::spawn(pump.run());

        sink_log!(
            Level::Info,
            "sink",
            "Sink open on {:?} table {} (batch={}, buffer={})",
            config.path(),
            config.table_name(),
            config.batch_size(),
            config.max_buffer_size()
        );
        Ok(Self { config, writer, tx, pump, sweeper })
    }

    /// Encode and enqueue one event. Returns `false` when the event was
    /// dropped because the buffer is full or the sink is shutting down.
    pub fn emit(&self, event: &LogEvent) -> bool {
        let record = encode(event, self.config.store_timestamp_in_utc());
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::counter!("logsink_events_dropped_total").increment(1);
                sink_log!(Level::Warn, "sink", "Buffer full ({} events), dropping event", self.config.max_buffer_size());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Direct access to the serialized writer, bypassing the queue.
    pub fn writer(&self) -> &BatchWriter {
        &self.writer
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Flush everything still queued, then stop the pump and the sweeper.
    pub async fn shutdown(self) {
        let Self { tx, pump, sweeper, .. } = self;
        drop(tx);
        if let Err(e) = pump.await {
            sink_log!(Level::Error, "sink", "Pump task ended abnormally: {}", e);
        }
        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await;
        }
        sink_log!(Level::Info, "sink", "Sink closed");
    }
}

/// Drains the queue into batches and feeds them to a `BatchSink`.
pub struct Pump {
    sink: Arc<dyn BatchSink>,
    rx: mpsc::Receiver<LogRecord>,
    batch_size: usize,
    max_buffer_size: usize,
    flush_period: Duration,
    pending: VecDeque<LogRecord>,
    retry: Option<Arc<[LogRecord]>>,
}

impl Pump {
    pub fn new(sink: Arc<dyn BatchSink>, rx: mpsc::Receiver<LogRecord>, config: &StoreConfig) -> Self {
        Self {
            sink,
            rx,
            batch_size: config.batch_size(),
            max_buffer_size: config.max_buffer_size(),
            flush_period: config.flush_period(),
            pending: VecDeque::with_capacity(config.batch_size()),
            retry: None,
        }
    }

    /// Run until every sender is dropped, then flush what is left.
    pub async fn run(mut self) {
        // first flush one period after start, not immediately
        let start = tokio::time::Instant::now() + self.flush_period;
        let mut ticker = tokio::time::interval_at(start, self.flush_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe = self.rx.recv() => match maybe {
                    Some(rec) => {
                        self.push(rec);
                        if self.pending.len() >= self.batch_size && self.retry.is_none() {
                            self.flush().await;
                        }
                    }
                    None => {
                        if !self.flush().await {
                            let lost = self.buffered();
                            sink_log!(Level::Error, "pump", "Shutting down with {} unwritten records", lost);
                        }
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }
    }

    fn buffered(&self) -> usize {
        self.pending.len() + self.retry.as_ref().map_or(0, |b| b.len())
    }

    fn push(&mut self, rec: LogRecord) {
        self.pending.push_back(rec);
        while self.buffered() > self.max_buffer_size && self.pending.pop_front().is_some() {
            metrics::counter!("logsink_events_dropped_total").increment(1);
        }
    }

    /// Write everything buffered, one batch at a time. Stops at the first
    /// failed batch, keeping it for the next attempt. Returns `true` when the
    /// buffer was fully written.
    async fn flush(&mut self) -> bool {
        loop {
            let batch = match self.retry.take() {
                Some(batch) => batch,
                None if self.pending.is_empty() => return true,
                None => {
                    let n = self.batch_size.min(self.pending.len());
                    self.pending.drain(..n).collect::<Arc<[LogRecord]>>()
                }
            };
            match self.sink.write(Arc::clone(&batch)).await {
                Ok(_) => {}
                Err(e) if !e.is_retryable() => {
                    sink_log!(Level::Error, "pump", "Dropping {} rows that do not fit the database: {}", batch.len(), e);
                    metrics::counter!("logsink_rows_discarded_total").increment(batch.len() as u64);
                }
                Err(_) => {
                    sink_log!(Level::Debug, "pump", "Keeping {} rows for retry", batch.len());
                    self.retry = Some(batch);
                    return false;
                }
            }
        }
    }
}
