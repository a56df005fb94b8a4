// src/main.rs

//! Sink entry-point: pipes JSON log events from stdin into SQLite.
//!
//! 1. Parse configuration & set up structured logging
//! 2. Open the sink (schema, writer, pump, retention sweeper)
//! 3. Read one JSON event per line from stdin and emit it
//! 4. On EOF, flush and shut down cleanly

// ───── std / 3rd-party imports ──────────────────────────────────────────────
use anyhow::Context;
use chrono::{DateTime, FixedOffset, Local};
use fern::Dispatch;
use log::LevelFilter;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    path::{Path, PathBuf},
    process,
    thread,
};
use tokio::io::{AsyncBufReadExt, BufReader};

// ───── local imports ────────────────────────────────────────────────────────
use logsink::config::{self, Config};
use logsink::events::{Level, LogEvent};
use logsink::SqliteSink;

// ───── helpers ──────────────────────────────────────────────────────────────

/// Print an error with context and terminate the process.
macro_rules! fatal {
    ($ctx:expr, $($arg:tt)+) => {{
        eprintln!(
            "[{}][ERROR][{}] {}",
            chrono::Local::now().to_rfc3339(),
            $ctx,
            format!($($arg)+)
        );
        std::process::exit(1);
    }};
}

/// One line of stdin.
#[derive(Debug, Deserialize)]
struct InputEvent {
    #[serde(default)]
    timestamp: Option<DateTime<FixedOffset>>,
    #[serde(default = "default_input_level")]
    level: String,
    template: String,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default)]
    exception: Option<String>,
}
fn default_input_level() -> String { "Information".into() }

impl InputEvent {
    fn into_event(self) -> anyhow::Result<LogEvent> {
        let level: Level = self.level.parse()?;
        Ok(LogEvent {
            timestamp: self.timestamp.unwrap_or_else(|| Local::now().fixed_offset()),
            level,
            message_template: self.template,
            properties: self.properties,
            exception: self.exception,
        })
    }
}

/// Config path from argv[1], else `default.toml` next to the executable.
fn config_path() -> PathBuf {
    if let Some(arg) = std::env::args_os().nth(1) {
        return PathBuf::from(arg);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.join("default.toml")))
        .unwrap_or_else(|| PathBuf::from("default.toml"))
}

/// Configure global logging as requested in `[logging]`.
fn setup_logging(base_dir: &Path, cfg: &Config) -> Result<(), fern::InitError> {
    let level = match cfg.logging.level.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let log_path = cfg
        .logging
        .enable
        .then(|| base_dir.join(cfg.logging.file.as_deref().unwrap_or("logsink.log")));

    // sink_log! lines already carry their own prefix
    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            if record.target().starts_with("logsink::") {
                out.finish(format_args!("{}", msg))
            } else {
                out.finish(format_args!(
                    "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                    Local::now().to_rfc3339(),
                    record.level(),
                    record.target(),
                    process::id(),
                    thread::current().id(),
                    msg
                ))
            }
        })
        .level(level)
        .chain(std::io::stderr());

    if let Some(path) = log_path {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

async fn pipe_stdin(sink: &SqliteSink) -> anyhow::Result<(usize, usize)> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (mut emitted, mut rejected) = (0, 0);

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str::<InputEvent>(&line)
            .map_err(anyhow::Error::from)
            .and_then(InputEvent::into_event);
        match event {
            Ok(ev) if sink.emit(&ev) => emitted += 1,
            Ok(_) => rejected += 1,
            Err(e) => {
                log::warn!("Skipping malformed line: {}", e);
                rejected += 1;
            }
        }
    }
    Ok((emitted, rejected))
}

#[tokio::main]
async fn main() {
    // 1 ─ Context
    let cfg_path = config_path();
    let cfg = config::load(&cfg_path).unwrap_or_else(|e| fatal!("config", "{}", e));
    let base_dir = cfg_path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    // 2 ─ Logging
    if let Err(e) = setup_logging(&base_dir, &cfg) {
        fatal!("logging", "{}", e);
    }
    log::info!("Bootstrap from {}", cfg_path.display());

    // 3 ─ Sink
    let sink = SqliteSink::open(cfg.sink)
        .await
        .unwrap_or_else(|e| fatal!("database", "{}", e));

    // 4 ─ Pipe
    let result = pipe_stdin(&sink).await;

    // 5 ─ Shutdown
    sink.shutdown().await;
    match result {
        Ok((emitted, rejected)) => log::info!("Done: {} events emitted, {} rejected", emitted, rejected),
        Err(e) => fatal!("stdin", "{:#}", e),
    }
}
