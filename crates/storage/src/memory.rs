//! In-Memory Store

use crate::{ResultStore, RunManifest, StorageError, StoredBatch, TaskId};
use alert_model::RawSample;
use std::sync::Mutex;
use tracing::{debug, info};

/// Result store kept in process memory
pub struct MemoryStore {
    /// Appended batches in arrival order
    batches: Mutex<Vec<StoredBatch>>,
    manifest: Mutex<Option<RunManifest>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        info!("Creating in-memory result store");
        Self {
            batches: Mutex::new(Vec::with_capacity(256)),
            manifest: Mutex::new(None),
        }
    }

    /// Number of appended batches
    pub fn batch_count(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Task ids in append order
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.batches
            .lock()
            .map(|b| b.iter().map(|batch| batch.task_id).collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore for MemoryStore {
    fn append(&self, task_id: TaskId, samples: &[RawSample]) -> Result<(), StorageError> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        batches.push(StoredBatch {
            task_id,
            samples: samples.to_vec(),
        });
        debug!("Stored {} samples for task {}", samples.len(), task_id);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<RawSample>, StorageError> {
        let batches = self
            .batches
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        Ok(batches
            .iter()
            .flat_map(|batch| batch.samples.iter().cloned())
            .collect())
    }

    fn write_manifest(&self, manifest: &RunManifest) -> Result<(), StorageError> {
        let mut slot = self
            .manifest
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        *slot = Some(*manifest);
        Ok(())
    }

    fn read_manifest(&self) -> Result<Option<RunManifest>, StorageError> {
        self.manifest
            .lock()
            .map(|slot| *slot)
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn sample(timestamp: i64) -> RawSample {
        RawSample::new("HighLatency", BTreeMap::new(), timestamp, 1.0)
    }

    #[test]
    fn test_append_and_read_all() {
        let store = MemoryStore::new();

        store.append(1, &[sample(0), sample(60)]).unwrap();
        store.append(2, &[sample(120)]).unwrap();

        let samples = store.read_all().unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2].timestamp, 120);
        assert_eq!(store.task_ids(), vec![1, 2]);
    }

    #[test]
    fn test_concurrent_appends() {
        let store = Arc::new(MemoryStore::new());

        let handles: Vec<_> = (0..8)
            .map(|task_id| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.append(task_id, &[sample(task_id as i64)]).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.batch_count(), 8);
        assert_eq!(store.read_all().unwrap().len(), 8);
    }

    #[test]
    fn test_manifest_is_replaced() {
        let store = MemoryStore::new();
        assert_eq!(store.read_manifest().unwrap(), None);

        let first = RunManifest { started_at: 100, downsample_boundary: None };
        let second = RunManifest { started_at: 200, downsample_boundary: Some(50) };
        store.write_manifest(&first).unwrap();
        store.write_manifest(&second).unwrap();
        assert_eq!(store.read_manifest().unwrap(), Some(second));
    }
}
