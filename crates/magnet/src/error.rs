//! Orchestration Error Types

use crate::logging::LoggingError;
use crate::settings::ConfigError;
use alert_model::TimeRangeError;
use query_engine::{BackendError, SplitError};
use storage::StorageError;
use thiserror::Error;

/// Errors that abort a run before or outside the fetch phase
#[derive(Debug, Error)]
pub enum MagnetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Split error: {0}")]
    Split(#[from] SplitError),

    #[error("Invalid history window: {0}")]
    TimeRange(#[from] TimeRangeError),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),
}
