// src/db/connection.rs
//! Opening SQLite files and creating the log table.

use std::{fs, path::{Path, PathBuf}, time::Duration};
use rusqlite::{Connection, ErrorCode};
use thiserror::Error;
use crate::config::model::BYTES_PER_MB;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("cannot open database {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// `true` when SQLite refused to grow the file (`SQLITE_FULL`).
pub fn is_storage_full(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::DiskFull)
}

/// Open (or create) the database at `path` in WAL mode, capped at
/// `max_database_size_mb`. The cap is per connection, so every handle sets it.
pub fn open_db_connection(path: &Path, max_database_size_mb: u32) -> Result<Connection, DbError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path).map_err(|source| DbError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    conn.busy_timeout(Duration::from_millis(1_000))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    let page_size: i64 = conn.pragma_query_value(None, "page_size", |r| r.get(0))?;
    let max_pages = i64::from(max_database_size_mb) * BYTES_PER_MB as i64 / page_size.max(1);
    conn.pragma_update_and_check(None, "max_page_count", max_pages, |r| r.get::<_, i64>(0))?;
    Ok(conn)
}

/// `CREATE TABLE IF NOT EXISTS` for the log table. Safe to call repeatedly.
pub fn ensure_schema(conn: &Connection, table: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (\
            Id INTEGER PRIMARY KEY AUTOINCREMENT,\
            TimeStamp TEXT,\
            Level VARCHAR(10),\
            Exception TEXT,\
            Message TEXT,\
            Properties TEXT,\
            MessageTemplate TEXT,\
            LogEvent TEXT,\
            UserName TEXT,\
            ClientIP TEXT,\
            ClientAgent TEXT\
        )"
    ))
}

/// Open the database and make sure the table exists.
pub fn init_database(path: &Path, table: &str, max_database_size_mb: u32) -> Result<Connection, DbError> {
    let conn = open_db_connection(path, max_database_size_mb)?;
    ensure_schema(&conn, table)?;
    log::info!("Log table \"{}\" ready at {}", table, path.display());
    Ok(conn)
}
