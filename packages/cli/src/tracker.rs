// ABOUTME: Persistence wrapper that lets the CLI wait for a batch to finish
// ABOUTME: Forwards every terminal record to the real store and keeps a copy for the summary

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use taskweave_core::{PersistenceError, Task, TaskPersistence};
use tokio::sync::Notify;

pub struct CompletionTracker {
    inner: Arc<dyn TaskPersistence>,
    finished: Mutex<Vec<Task>>,
    notify: Notify,
}

impl CompletionTracker {
    pub fn new(inner: Arc<dyn TaskPersistence>) -> Self {
        Self {
            inner,
            finished: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    pub fn finished(&self) -> Vec<Task> {
        self.finished
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.finished.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Resolve once at least `n` tasks have reached a terminal status
    pub async fn wait_for(&self, n: usize) {
        loop {
            let notified = self.notify.notified();
            if self.count() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl TaskPersistence for CompletionTracker {
    async fn persist(&self, task: &Task) -> Result<(), PersistenceError> {
        // Counted even when the inner store fails so the batch can still finish
        let result = self.inner.persist(task).await;
        if let Ok(mut finished) = self.finished.lock() {
            finished.push(task.clone());
        }
        self.notify.notify_waiters();
        result
    }
}
