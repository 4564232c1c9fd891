// ABOUTME: File-backed task persistence writing one JSON record per terminal task
// ABOUTME: Each record is written atomically through the FileStore; there is no cross-record index

use async_trait::async_trait;
use std::path::PathBuf;
use taskweave_core::{PersistenceError, Task, TaskPersistence};
use tracing::debug;

use crate::file_store::FileStore;

/// Stores `<dir>/<task_id>.json`. A later record for the same ID replaces the earlier one.
#[derive(Debug, Clone)]
pub struct FileTaskPersistence {
    store: FileStore,
}

impl FileTaskPersistence {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: FileStore::new(results_dir),
        }
    }

    fn record_name(task_id: &str) -> String {
        let safe: String = task_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}.json", safe)
    }

    /// Load a previously persisted record
    pub async fn load(&self, task_id: &str) -> Result<Task, PersistenceError> {
        let to_err = |reason: String| PersistenceError {
            task_id: task_id.to_string(),
            reason,
        };
        let raw = self
            .store
            .read_file(&Self::record_name(task_id))
            .await
            .map_err(|e| to_err(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| to_err(e.to_string()))
    }
}

#[async_trait]
impl TaskPersistence for FileTaskPersistence {
    async fn persist(&self, task: &Task) -> Result<(), PersistenceError> {
        let to_err = |reason: String| PersistenceError {
            task_id: task.id.clone(),
            reason,
        };
        let body = serde_json::to_string_pretty(task).map_err(|e| to_err(e.to_string()))?;
        self.store
            .write_file(&Self::record_name(&task.id), &body)
            .await
            .map_err(|e| to_err(e.to_string()))?;

        debug!(task_id = %task.id, status = %task.status, "Persisted task record");
        Ok(())
    }
}
