// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

mod macros;
pub mod config;
pub mod db;
pub mod events;
pub mod record;
pub mod sink;

pub use config::{Config, ConfigError, SinkSettings, StoreConfig};
pub use db::{BatchOutcome, BatchSink, BatchWriter, RetentionSweeper, WriteError, WriteGate};
pub use events::{Level, LogEvent};
pub use record::{encode, LogRecord};
pub use sink::{SinkError, SqliteSink};

#[doc(hidden)]
pub mod __private {
    pub use chrono;
    pub use log;
}
