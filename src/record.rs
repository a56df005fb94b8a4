//! Encoding of `LogEvent`s into the fixed column set of the log table.

use chrono::{DateTime, TimeZone, Utc};
use crate::events::LogEvent;

/// Text pattern of the `TimeStamp` column (`yyyy-MM-ddTHH:mm:ss.fff`).
///
/// Retention compares this text lexicographically, so it must stay fixed-width
/// and zero-padded.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub const USER_NAME_PROPERTY: &str = "UserName";
pub const CLIENT_IP_PROPERTY: &str = "ClientIP";
pub const CLIENT_AGENT_PROPERTY: &str = "ClientAgent";

/// One row of the log table. Absent values are empty strings, never NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: String,
    pub exception: String,
    pub message: String,
    pub message_template: String,
    pub properties: String,
    pub log_event: String,
    pub user_name: String,
    pub client_ip: String,
    pub client_agent: String,
}

/// Format an instant in the column format, in UTC or in its own offset.
pub fn format_timestamp<Tz: TimeZone>(ts: &DateTime<Tz>, utc: bool) -> String
where
    Tz::Offset: std::fmt::Display,
{
    if utc {
        ts.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string()
    } else {
        ts.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Encode an event. Total: every event yields a record.
pub fn encode(event: &LogEvent, utc: bool) -> LogRecord {
    let properties = if event.properties.is_empty() {
        String::new()
    } else {
        serde_json::Value::Object(event.properties.clone()).to_string()
    };

    LogRecord {
        timestamp: format_timestamp(&event.timestamp, utc),
        level: event.level.to_string(),
        exception: event.exception.clone().unwrap_or_default(),
        message: event.render_message(),
        message_template: event.message_template.clone(),
        properties,
        log_event: event.to_json(),
        user_name: event.property_text(USER_NAME_PROPERTY).unwrap_or_default(),
        client_ip: event.property_text(CLIENT_IP_PROPERTY).unwrap_or_default(),
        client_agent: event.property_text(CLIENT_AGENT_PROPERTY).unwrap_or_default(),
    }
}
