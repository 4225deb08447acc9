//! Result Store
//!
//! Persists raw samples as soon as a range has been fetched, so a crash
//! mid-run loses at most the in-flight batch, and lets a later run
//! reprocess history without re-fetching it.

mod file;
mod memory;

pub use file::JsonLinesStore;
pub use memory::MemoryStore;

use alert_model::{RawSample, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of the query task a batch was fetched by
pub type TaskId = u64;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Lock error: {0}")]
    LockPoisoned(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Corrupt record at line {line}: {message}")]
    CorruptRecord { line: usize, message: String },
}

/// One appended batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBatch {
    pub task_id: TaskId,
    pub samples: Vec<RawSample>,
}

/// Parameters of the run that filled a store, needed to reprocess its
/// samples the same way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    /// `now` the history window was computed from
    pub started_at: Timestamp,
    /// Start of raw-resolution data; older samples are downsampled
    pub downsample_boundary: Option<Timestamp>,
}

/// Append/read contract for fetched samples.
///
/// Implementations must tolerate concurrent appends from many workers.
pub trait ResultStore: Send + Sync {
    /// Persist the samples fetched by one task
    fn append(&self, task_id: TaskId, samples: &[RawSample]) -> Result<(), StorageError>;

    /// Read back every sample appended so far, in append order
    fn read_all(&self) -> Result<Vec<RawSample>, StorageError>;

    /// Record the run parameters; a later call replaces the earlier one
    fn write_manifest(&self, manifest: &RunManifest) -> Result<(), StorageError>;

    /// Run parameters, if a run recorded them
    fn read_manifest(&self) -> Result<Option<RunManifest>, StorageError>;
}
