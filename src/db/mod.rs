// src/db/mod.rs
//! Public façade for DB helpers (re-exports plus the write gate).

pub mod connection;
pub mod maintenance;
pub mod db_writer;
pub mod batch_inserts;
pub mod rollover;

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub use batch_inserts::BatchInsert;
pub use connection::{ensure_schema, init_database, open_db_connection, DbError};
pub use db_writer::{BatchOutcome, BatchSink, BatchWriter, WriteError};
pub use maintenance::{RetentionSweeper, SweeperHandle};
pub use rollover::{rollover_path, RolloverError};

/// Serializes every unit of work against one database file: batch writes,
/// rollovers and retention deletes. Clones share the same gate.
#[derive(Clone, Default)]
pub struct WriteGate(Arc<Mutex<()>>);

/// Proof of holding the gate; released on drop.
pub type GatePass = OwnedMutexGuard<()>;

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access without blocking the runtime thread.
    pub async fn acquire(&self) -> GatePass {
        Arc::clone(&self.0).lock_owned().await
    }
}
