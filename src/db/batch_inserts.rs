// src/db/batch_inserts.rs

use rusqlite::{params, Connection, Result as SqlResult, Statement};
use crate::record::LogRecord;

/// Defines how to insert a batch of rows of type T
pub trait BatchInsert<T> {
    fn insert_sql(table: &str) -> String;
    fn bind_and_execute(stmt: &mut Statement<'_>, record: &T) -> SqlResult<()>;
}

/// LOG RECORDS
impl BatchInsert<LogRecord> for LogRecord {
    fn insert_sql(table: &str) -> String {
        format!(
            "INSERT INTO \"{table}\" \
               (TimeStamp, Level, Exception, Message, Properties, MessageTemplate, \
                LogEvent, UserName, ClientIP, ClientAgent) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)"
        )
    }

    fn bind_and_execute(stmt: &mut Statement<'_>, rec: &LogRecord) -> SqlResult<()> {
        stmt.execute(params![
            rec.timestamp,
            rec.level,
            rec.exception,
            rec.message,
            rec.properties,
            rec.message_template,
            rec.log_event,
            rec.user_name,
            rec.client_ip,
            rec.client_agent,
        ])?;
        Ok(())
    }
}

/// Insert `records` in order inside one transaction, reusing one prepared
/// statement. Nothing is committed unless every row succeeds.
pub fn insert_batch<T: BatchInsert<T>>(
    conn: &mut Connection,
    table: &str,
    records: &[T],
) -> SqlResult<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(&T::insert_sql(table))?;
        for rec in records {
            T::bind_and_execute(&mut stmt, rec)?;
        }
    }
    tx.commit()
}
