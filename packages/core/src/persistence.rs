// ABOUTME: Best-effort persistence contract for terminal task records
// ABOUTME: Failures are reported to the caller for logging only, never retried

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::types::Task;

#[derive(Debug, Error)]
#[error("Failed to persist task {task_id}: {reason}")]
pub struct PersistenceError {
    pub task_id: String,
    pub reason: String,
}

/// Receives every task once it reaches `Completed` or `Failed`.
///
/// This is a best-effort contract. Callers log an `Err` as a warning and move
/// on; the task's status is already final by the time it gets here.
#[async_trait]
pub trait TaskPersistence: Send + Sync {
    async fn persist(&self, task: &Task) -> Result<(), PersistenceError>;
}

/// Discards records
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

#[async_trait]
impl TaskPersistence for NoopPersistence {
    async fn persist(&self, task: &Task) -> Result<(), PersistenceError> {
        debug!(task_id = %task.id, status = %task.status, "Discarding task record");
        Ok(())
    }
}

/// Keeps records in memory, in arrival order
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: Mutex<Vec<Task>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Task> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskPersistence for MemoryPersistence {
    async fn persist(&self, task: &Task) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().map_err(|e| PersistenceError {
            task_id: task.id.clone(),
            reason: e.to_string(),
        })?;
        records.push(task.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    #[tokio::test]
    async fn test_memory_persistence_keeps_order() {
        let store = MemoryPersistence::new();
        let mut first = Task::new("a", "first");
        first.status = TaskStatus::Completed;
        let second = Task::new("b", "second");

        store.persist(&first).await.unwrap();
        store.persist(&second).await.unwrap();

        let ids: Vec<_> = store.records().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_noop_persistence_accepts_everything() {
        assert!(NoopPersistence.persist(&Task::new("a", "x")).await.is_ok());
    }
}
