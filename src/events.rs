//! Structured log event model.
//!
//! A `LogEvent` is what producers hand to the sink: a timestamp, a severity,
//! an unrendered message template and a bag of named properties. The store
//! never keeps the event itself; it is encoded into a `LogRecord` first.
//!
//! ## Rendering
//! - `render_message` substitutes `{Name}` tokens with property text
//! - `to_json` produces the full serialized event kept in the `LogEvent` column

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Severity of a log event. Stored in the table by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Verbose,
    Debug,
    Information,
    Warning,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Verbose => "Verbose",
            Level::Debug => "Debug",
            Level::Information => "Information",
            Level::Warning => "Warning",
            Level::Error => "Error",
            Level::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown log level '{0}'")]
pub struct UnknownLevel(pub String);

/// Accepts both the stored names and the short forms used by `log`.
impl FromStr for Level {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "verbose" | "trace" => Ok(Level::Verbose),
            "debug" => Ok(Level::Debug),
            "information" | "info" => Ok(Level::Information),
            "warning" | "warn" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "fatal" | "critical" => Ok(Level::Fatal),
            other => Err(UnknownLevel(other.into())),
        }
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Verbose,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Information,
            log::Level::Warn => Level::Warning,
            log::Level::Error => Level::Error,
        }
    }
}

/// One structured log event as produced by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<FixedOffset>,
    pub level: Level,
    pub message_template: String,
    pub properties: Map<String, Value>,
    pub exception: Option<String>,
}

impl LogEvent {
    /// New event stamped with the local clock and no properties.
    pub fn new(level: Level, message_template: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().fixed_offset(),
            level,
            message_template: message_template.into(),
            properties: Map::new(),
            exception: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Text form of a property, or `None` if the event does not carry it.
    pub fn property_text(&self, name: &str) -> Option<String> {
        self.properties.get(name).map(value_text)
    }

    /// Render the message template against the event's properties.
    pub fn render_message(&self) -> String {
        render_template(&self.message_template, &self.properties)
    }

    /// Full serialized form of the event.
    pub fn to_json(&self) -> String {
        let doc = EventDocument {
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
            level: self.level,
            message_template: &self.message_template,
            exception: self.exception.as_deref(),
            properties: (!self.properties.is_empty()).then_some(&self.properties),
        };
        // A struct of strings and a JSON map cannot fail to serialize.
        serde_json::to_string(&doc).unwrap_or_default()
    }
}

/// Shape of the full serialized event.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EventDocument<'a> {
    timestamp: String,
    level: Level,
    message_template: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<&'a Map<String, Value>>,
}

/// Strings verbatim, everything else as JSON text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace `{Name}` tokens with property text.
///
/// `{@Name}` / `{$Name}` hints and `,align` / `:format` suffixes are accepted and
/// ignored. `{{` and `}}` are literal braces. Tokens naming a missing property
/// are copied through unchanged.
pub fn render_template(template: &str, properties: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        match tail.find('}') {
            Some(end) => {
                let token = &tail[..=end];
                let inner = &tail[1..end];
                let name = inner
                    .trim_start_matches(['@', '$'])
                    .split([',', ':'])
                    .next()
                    .unwrap_or_default();
                match properties.get(name) {
                    Some(value) if !name.is_empty() => out.push_str(&value_text(value)),
                    _ => out.push_str(token),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn renders_named_properties() {
        let p = props(json!({"UserName": "alice", "Count": 3}));
        assert_eq!(render_template("{UserName} has {Count} items", &p), "alice has 3 items");
    }

    #[test]
    fn keeps_unknown_tokens_and_escapes() {
        let p = props(json!({"A": 1}));
        assert_eq!(render_template("{{literal}} {Missing} {A}", &p), "{literal} {Missing} 1");
        assert_eq!(render_template("unterminated {A", &p), "unterminated {A");
    }

    #[test]
    fn ignores_hints_and_format_suffixes() {
        let p = props(json!({"Order": {"id": 7}, "Elapsed": 12.5}));
        assert_eq!(
            render_template("{@Order} in {Elapsed:0.00} ms", &p),
            r#"{"id":7} in 12.5 ms"#
        );
    }

    #[test]
    fn json_omits_empty_parts() {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T10:00:00.250+01:00").unwrap();
        let ev = LogEvent::new(Level::Warning, "plain").at(ts);
        assert_eq!(
            ev.to_json(),
            r#"{"Timestamp":"2024-03-01T10:00:00.250+01:00","Level":"Warning","MessageTemplate":"plain"}"#
        );

        let ev = ev.with_exception("boom").with_property("K", "v");
        let back: Value = serde_json::from_str(&ev.to_json()).unwrap();
        assert_eq!(back["Exception"], "boom");
        assert_eq!(back["Properties"]["K"], "v");
    }

    #[test]
    fn parses_level_aliases() {
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("Information".parse::<Level>().unwrap(), Level::Information);
        assert!("loud".parse::<Level>().is_err());
        assert_eq!(Level::from(log::Level::Trace), Level::Verbose);
    }
}
