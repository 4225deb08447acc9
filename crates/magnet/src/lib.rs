//! AlertMagnet
//!
//! Fetches the firing history of all alerts from a Prometheus/Thanos API,
//! infers which alert types are predicted by others and reports the root
//! alerts worth paging on.

mod error;
mod logging;
mod pipeline;
mod settings;
mod telemetry;

pub use error::MagnetError;
pub use logging::{init_logging, parse_level, resolve_format, LoggingConfig, LoggingError};
pub use pipeline::{reprocess, run, Analysis, RangeGap, RunReport, RunStatus};
pub use settings::{parse_duration, ConfigError, MagnetConfig};
pub use telemetry::{install_exporter, record_analysis};

use std::path::{Path, PathBuf};

/// Fresh result directory for one run below `root`
pub fn run_directory(root: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    root.join(format!("{}-{}", stamp, uuid::Uuid::new_v4()))
}
