//! JSON-Lines File Store
//!
//! Every appended batch becomes one line of `samples.jsonl` inside the run
//! directory. Lines are flushed before `append` returns. The run parameters
//! live next to it in `manifest.json`.

use crate::{ResultStore, RunManifest, StorageError, StoredBatch, TaskId};
use alert_model::RawSample;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

const SAMPLES_FILE: &str = "samples.jsonl";
const MANIFEST_FILE: &str = "manifest.json";

/// File-backed result store
pub struct JsonLinesStore {
    path: PathBuf,
    manifest_path: PathBuf,
    writer: Mutex<File>,
}

impl JsonLinesStore {
    /// Open (or create) the store inside `directory`
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, StorageError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;

        let path = directory.join(SAMPLES_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!("Opened result store at {}", path.display());
        Ok(Self {
            path,
            manifest_path: directory.join(MANIFEST_FILE),
            writer: Mutex::new(file),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_batches(&self) -> Result<Vec<StoredBatch>, StorageError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut batches = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let batch = serde_json::from_str::<StoredBatch>(&line).map_err(|e| {
                StorageError::CorruptRecord {
                    line: index + 1,
                    message: e.to_string(),
                }
            })?;
            batches.push(batch);
        }

        Ok(batches)
    }
}

impl ResultStore for JsonLinesStore {
    fn append(&self, task_id: TaskId, samples: &[RawSample]) -> Result<(), StorageError> {
        let batch = StoredBatch {
            task_id,
            samples: samples.to_vec(),
        };
        let mut line = serde_json::to_string(&batch)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        line.push('\n');

        let mut writer = self
            .writer
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;

        debug!("Appended {} samples for task {}", samples.len(), task_id);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<RawSample>, StorageError> {
        // Hold the writer lock so no half-written line is observed
        let _guard = self
            .writer
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        Ok(self
            .read_batches()?
            .into_iter()
            .flat_map(|batch| batch.samples)
            .collect())
    }

    fn write_manifest(&self, manifest: &RunManifest) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&self.manifest_path, json)?;
        debug!("Wrote run manifest to {}", self.manifest_path.display());
        Ok(())
    }

    fn read_manifest(&self) -> Result<Option<RunManifest>, StorageError> {
        let json = match fs::read(&self.manifest_path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&json)
            .map(Some)
            .map_err(|e| StorageError::CorruptRecord {
                line: 1,
                message: format!("{}: {}", MANIFEST_FILE, e),
            })
    }
}
