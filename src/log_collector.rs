//! Disk-backed logging sink.
//!
//! # Architecture
//!
//! ```text
//! log::info!() / log_info!()
//!     |
//! [LogCollector] (implements log::Log, never blocks the caller)
//!     | (crossbeam unbounded channel)
//!     v
//! [writer thread] -> <log_dir>/<YYYYmmdd_HHMMSS>.log
//! ```
//!
//! Warnings and errors are also echoed to stderr so that the command line
//! user sees them without opening the log file.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Internal log line or special marker
enum LogMessage {
    Line(LogLine),
    /// Flush marker; answered with the first write error since the previous flush
    Flush(std::sync::mpsc::Sender<Result<(), String>>),
}

/// Get the global logs path: ~/.local/share/kernkeep/logs
pub fn get_global_logs_path() -> Result<PathBuf, String> {
    let base = dirs::data_local_dir()
        .ok_or_else(|| "Cannot determine local data directory".to_string())?;
    Ok(base.join("kernkeep").join("logs"))
}

/// Ensure the logs directory exists
pub fn ensure_logs_dir_exists(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create logs directory: {}", e))
}

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    pub level: Level,
    /// HH:MM:SS.mmm
    pub timestamp: String,
}

impl LogLine {
    pub fn new(level: Level, message: String) -> Self {
        LogLine {
            message,
            level,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    fn format(&self) -> String {
        format!("[{}] [{}] {}\n", self.timestamp, self.level, self.message)
    }
}

/// `log` sink writing every record to one session log file
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_path: PathBuf,
    max_level: LevelFilter,
    echo_level: Level,
}

impl LogCollector {
    /// Create the session log file under `log_dir` and start the writer thread.
    pub fn new(log_dir: &Path, max_level: LevelFilter) -> Result<Self, String> {
        ensure_logs_dir_exists(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", Local::now().format("%Y%m%d_%H%M%S")));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| format!("Failed to open log file {}: {}", log_path.display(), e))?;

        Ok(LogCollector {
            tx: spawn_writer(file),
            log_path,
            max_level,
            echo_level: Level::Warn,
        })
    }

    /// Also echo records up to `level` to stderr.
    pub fn with_echo_level(mut self, level: Level) -> Self {
        self.echo_level = level;
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Send a log line (non-blocking)
    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Block until every line sent before this call is on disk.
    pub fn wait_for_empty(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.tx
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))?
    }
}

fn spawn_writer(mut file: File) -> Sender<LogMessage> {
    let (tx, rx) = unbounded::<LogMessage>();

    std::thread::spawn(move || {
        let mut failure: Option<String> = None;
        while let Ok(msg) = rx.recv() {
            match msg {
                LogMessage::Line(line) => {
                    if let Err(e) = file.write_all(line.format().as_bytes()) {
                        failure.get_or_insert_with(|| format!("Failed to write log line: {}", e));
                    }
                }
                LogMessage::Flush(done) => {
                    if let Err(e) = file.flush() {
                        failure.get_or_insert_with(|| format!("Failed to flush log file: {}", e));
                    }
                    let _ = done.send(failure.take().map_or(Ok(()), Err));
                }
            }
        }
    });

    tx
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        if record.level() <= self.echo_level {
            eprintln!("{}: {}", record.level().as_str().to_lowercase(), message);
        }
        self.log_line(LogLine::new(record.level(), message));
    }

    fn flush(&self) {
        let _ = self.wait_for_empty();
    }
}

/// Install a `LogCollector` as the global logger.
///
/// Returns the collector so the caller can flush it before exiting.
pub fn init_logging(log_dir: &Path, debug: bool) -> Result<LogCollector, String> {
    let max_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let collector = LogCollector::new(log_dir, max_level)?;
    log::set_boxed_logger(Box::new(collector.clone()))
        .map(|()| log::set_max_level(max_level))
        .map_err(|e| format!("Failed to set global logger: {}", e))?;

    log::debug!("[Log] Logging to {}", collector.log_path().display());
    Ok(collector)
}
