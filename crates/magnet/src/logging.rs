//! Logging Setup
//!
//! Level names follow the Python-style names operators already use
//! (`WARNING`, `CRITICAL`). The output format is picked once at startup
//! from a fixed name registry.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::FmtSubscriber;

const LOG_FILE: &str = "alertmagnet.log";

/// Logging setup errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Unknown log level {0:?}")]
    UnknownLevel(String),

    #[error("Unknown log format {0:?}, expected one of: {1}")]
    UnknownFormat(String, String),

    #[error("Cannot open log file: {0}")]
    File(#[from] std::io::Error),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// DEBUG, INFO, WARNING, ERROR or CRITICAL
    pub level: String,
    /// Registered format name
    pub format: String,
    /// Also write to `alertmagnet.log` in `directory`
    pub to_file: bool,
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: "text".to_string(),
            to_file: false,
            directory: PathBuf::from("logs"),
        }
    }
}

/// Installs a global subscriber writing to `writer`
pub type SubscriberInstaller = fn(Level, BoxMakeWriter, bool) -> Result<(), LoggingError>;

const FORMATS: &[(&str, SubscriberInstaller)] = &[("text", install_text), ("json", install_json)];

fn install_text(level: Level, writer: BoxMakeWriter, ansi: bool) -> Result<(), LoggingError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))
}

fn install_json(level: Level, writer: BoxMakeWriter, _ansi: bool) -> Result<(), LoggingError> {
    let subscriber = FmtSubscriber::builder()
        .json()
        .with_max_level(level)
        .with_target(true)
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))
}

/// Map a level name to a tracing level
pub fn parse_level(name: &str) -> Result<Level, LoggingError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" => Ok(Level::ERROR),
        _ => Err(LoggingError::UnknownLevel(name.to_string())),
    }
}

/// Look up a format in the registry
pub fn resolve_format(name: &str) -> Result<SubscriberInstaller, LoggingError> {
    let wanted = name.trim().to_ascii_lowercase();
    FORMATS
        .iter()
        .find(|(format, _)| *format == wanted)
        .map(|(_, installer)| *installer)
        .ok_or_else(|| {
            let known: Vec<&str> = FORMATS.iter().map(|(format, _)| *format).collect();
            LoggingError::UnknownFormat(name.to_string(), known.join(", "))
        })
}

/// Initialize logging; fails if a subscriber is already installed
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let level = parse_level(&config.level)?;
    let install = resolve_format(&config.format)?;

    if config.to_file {
        fs::create_dir_all(&config.directory)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.directory.join(LOG_FILE))?;
        let writer = BoxMakeWriter::new(std::io::stdout.and(Arc::new(file)));
        install(level, writer, false)
    } else {
        install(level, BoxMakeWriter::new(std::io::stdout), true)
    }
}
