// ABOUTME: Worker loop that pulls tasks from the shared queue and drives them to a terminal status
// ABOUTME: Each attempt runs under its own deadline; failures back off exponentially until retries run out

use std::sync::Arc;

use taskweave_core::{
    ActionPlan, FileOpKind, FileOperation, ReasoningError, ReasoningService, Task,
    TaskPersistence, TaskStatus, WorkerConfig,
};
use taskweave_sandbox::CodeExecutor;
use taskweave_storage::FileStore;
use tokio::sync::{mpsc, Mutex};
use tokio::time::error::Elapsed;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AttemptError;

pub(crate) type SharedQueue = Arc<Mutex<mpsc::Receiver<Task>>>;

/// Collaborators shared read-only by every worker in a pool
pub(crate) struct WorkerContext {
    pub reasoning: Arc<dyn ReasoningService>,
    pub executor: Arc<dyn CodeExecutor>,
    pub file_store: Arc<FileStore>,
    pub persistence: Arc<dyn TaskPersistence>,
    pub config: WorkerConfig,
}

/// How a worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue was closed and drained
    QueueClosed,
    /// The pool's cancellation token fired while the worker was idle
    Cancelled,
}

#[derive(Debug, Default)]
struct AttemptOutcome {
    result: String,
    execution_result: Option<String>,
}

pub(crate) struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
    consecutive_failures: u32,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>) -> Self {
        Self {
            id,
            ctx,
            consecutive_failures: 0,
        }
    }

    pub async fn run(mut self, queue: SharedQueue, shutdown: CancellationToken) -> WorkerExit {
        debug!(worker = self.id, "Worker started");

        loop {
            let Some(task) = Self::next_task(&queue, &shutdown).await else {
                let exit = if shutdown.is_cancelled() {
                    WorkerExit::Cancelled
                } else {
                    WorkerExit::QueueClosed
                };
                debug!(worker = self.id, ?exit, "Worker exiting");
                return exit;
            };

            let task = self.process_with_retry(task).await;
            self.record_outcome(&task);
            self.persist(&task).await;
        }
    }

    /// Wait for the next task. `None` means the queue closed or the pool was cancelled.
    async fn next_task(queue: &SharedQueue, shutdown: &CancellationToken) -> Option<Task> {
        // Cancellation wins over a ready task. The receiver guard is released
        // before the task is processed.
        let mut receiver = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return None,
            guard = queue.lock() => guard,
        };
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            task = receiver.recv() => task,
        }
    }

    pub(crate) async fn process_with_retry(&self, mut task: Task) -> Task {
        if let Err(e) = task.transition(TaskStatus::Running) {
            error!(worker = self.id, task_id = %task.id, "Cannot start task: {}", e);
            return task;
        }

        let max_retries = self.ctx.config.max_retries;
        let mut last_error = String::new();

        for attempt in 0..max_retries {
            task.attempts = attempt + 1;

            match self.attempt(&task).await {
                Ok(outcome) => {
                    task.execution_result = outcome.execution_result;
                    if let Err(e) = task.complete(outcome.result) {
                        error!(worker = self.id, task_id = %task.id, "Cannot complete task: {}", e);
                    }
                    return task;
                }
                Err(e) => {
                    last_error = e.to_string();

                    if !e.is_retriable() {
                        warn!(
                            worker = self.id,
                            task_id = %task.id,
                            attempt = task.attempts,
                            "Attempt failed with non-retriable error: {}", e
                        );
                        break;
                    }

                    warn!(
                        worker = self.id,
                        task_id = %task.id,
                        attempt = task.attempts,
                        max_retries,
                        "Attempt failed: {}", e
                    );

                    if attempt + 1 < max_retries {
                        let delay = self.ctx.config.backoff_for(attempt);
                        debug!(worker = self.id, task_id = %task.id, ?delay, "Backing off");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        if let Err(e) = task.fail(last_error) {
            error!(worker = self.id, task_id = %task.id, "Cannot fail task: {}", e);
        }
        task
    }

    /// One bounded attempt: plan, then optionally execute, then optionally touch a file
    async fn attempt(&self, task: &Task) -> Result<AttemptOutcome, AttemptError> {
        let timeout = self.ctx.config.task_timeout;
        let deadline = Instant::now() + timeout;
        let timed_out = |_: Elapsed| AttemptError::Timeout(timeout);

        let plan = timeout_at(deadline, self.ctx.reasoning.process_task(task))
            .await
            .map_err(timed_out)??;
        let file_op = check_plan(&plan)?;

        let mut outcome = AttemptOutcome::default();

        if plan.requires_execution {
            let language = plan
                .language
                .as_deref()
                .or(task.language.as_deref())
                .ok_or_else(|| {
                    ReasoningError::InvalidPlan(
                        "execution requested without a language".to_string(),
                    )
                })?;

            // The executor enforces the deadline itself so it can clean up
            let output = self
                .ctx
                .executor
                .execute_code(&plan.generated_code, language, deadline)
                .await?;
            outcome.execution_result = Some(output);
        }

        let mut file_content = None;
        if let Some((kind, op)) = file_op {
            match kind {
                FileOpKind::Write => {
                    let content = op.content.as_deref().unwrap_or_default();
                    timeout_at(deadline, self.ctx.file_store.write_file(&op.path, content))
                        .await
                        .map_err(timed_out)??;
                    debug!(task_id = %task.id, path = %op.path, "Wrote file");
                }
                FileOpKind::Read => {
                    let content = timeout_at(deadline, self.ctx.file_store.read_file(&op.path))
                        .await
                        .map_err(timed_out)??;
                    file_content = Some(content);
                }
            }
        }

        outcome.result = if !plan.result.is_empty() {
            plan.result
        } else if let Some(content) = file_content {
            content
        } else {
            outcome.execution_result.clone().unwrap_or_default()
        };

        Ok(outcome)
    }

    fn record_outcome(&mut self, task: &Task) {
        match task.status {
            TaskStatus::Completed => info!(
                worker = self.id,
                task_id = %task.id,
                attempts = task.attempts,
                "Task completed"
            ),
            TaskStatus::Failed => error!(
                worker = self.id,
                task_id = %task.id,
                attempts = task.attempts,
                "Task failed: {}",
                task.error.as_deref().unwrap_or("unknown error")
            ),
            TaskStatus::Pending | TaskStatus::Running => {}
        }

        if self.note_outcome(task.status) {
            error!(
                worker = self.id,
                consecutive_failures = self.consecutive_failures,
                "Worker reached its consecutive failure threshold"
            );
        }
    }

    /// Track the failure streak. Returns true when the streak lands on a
    /// multiple of the threshold; a threshold of 0 never fires.
    fn note_outcome(&mut self, status: TaskStatus) -> bool {
        match status {
            TaskStatus::Completed => {
                self.consecutive_failures = 0;
                false
            }
            TaskStatus::Failed => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let threshold = self.ctx.config.error_log_threshold;
                threshold > 0 && self.consecutive_failures % threshold == 0
            }
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }

    /// Best-effort: a failed write is logged and the task outcome stands
    async fn persist(&self, task: &Task) {
        if !task.status.is_terminal() {
            return;
        }
        if let Err(e) = self.ctx.persistence.persist(task).await {
            warn!(worker = self.id, task_id = %task.id, "Failed to persist task result: {}", e);
        }
    }
}

/// Reject malformed plans and unknown file operations before any side effect
fn check_plan(
    plan: &ActionPlan,
) -> Result<Option<(FileOpKind, &FileOperation)>, AttemptError> {
    plan.validate().map_err(ReasoningError::InvalidPlan)?;

    if !plan.requires_file_operation {
        return Ok(None);
    }
    match plan.file_operation.as_ref() {
        Some(op) => match op.kind() {
            Some(kind) => Ok(Some((kind, op))),
            None => Err(AttemptError::UnsupportedFileOperation(op.op.clone())),
        },
        None => Err(ReasoningError::InvalidPlan("missing file operation".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use taskweave_core::NoopPersistence;
    use taskweave_sandbox::ExecutorError;

    struct Unused;

    #[async_trait]
    impl ReasoningService for Unused {
        async fn process_task(&self, _task: &Task) -> Result<ActionPlan, ReasoningError> {
            Err(ReasoningError::Service("unused".into()))
        }
    }

    #[async_trait]
    impl CodeExecutor for Unused {
        async fn execute_code(
            &self,
            _source: &str,
            _language: &str,
            _deadline: Instant,
        ) -> Result<String, ExecutorError> {
            Err(ExecutorError::Timeout)
        }
    }

    fn worker_with_threshold(error_log_threshold: u32) -> Worker {
        let ctx = WorkerContext {
            reasoning: Arc::new(Unused),
            executor: Arc::new(Unused),
            file_store: Arc::new(FileStore::new(std::env::temp_dir())),
            persistence: Arc::new(NoopPersistence),
            config: WorkerConfig {
                error_log_threshold,
                ..Default::default()
            },
        };
        Worker::new(0, Arc::new(ctx))
    }

    #[test]
    fn test_failure_streak_fires_on_threshold_multiples() {
        let mut worker = worker_with_threshold(2);
        let fired: Vec<bool> = (0..5)
            .map(|_| worker.note_outcome(TaskStatus::Failed))
            .collect();
        assert_eq!(fired, vec![false, true, false, true, false]);
        assert_eq!(worker.consecutive_failures, 5);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let mut worker = worker_with_threshold(2);
        assert!(!worker.note_outcome(TaskStatus::Failed));
        assert!(!worker.note_outcome(TaskStatus::Completed));
        assert_eq!(worker.consecutive_failures, 0);
        assert!(!worker.note_outcome(TaskStatus::Failed));
        assert!(worker.note_outcome(TaskStatus::Failed));
    }

    #[test]
    fn test_zero_threshold_never_fires() {
        let mut worker = worker_with_threshold(0);
        for _ in 0..10 {
            assert!(!worker.note_outcome(TaskStatus::Failed));
        }
        assert_eq!(worker.consecutive_failures, 10);
    }

    #[test]
    fn test_failure_streak_saturates() {
        let mut worker = worker_with_threshold(3);
        worker.consecutive_failures = u32::MAX;
        worker.note_outcome(TaskStatus::Failed);
        assert_eq!(worker.consecutive_failures, u32::MAX);
    }

    fn file_plan(op: &str) -> ActionPlan {
        ActionPlan {
            requires_file_operation: true,
            file_operation: Some(FileOperation {
                op: op.to_string(),
                path: "out.txt".to_string(),
                content: Some("x".to_string()),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_check_plan_accepts_known_ops() {
        let write = file_plan("write");
        assert_eq!(check_plan(&write).unwrap().map(|(k, _)| k), Some(FileOpKind::Write));
        let read = file_plan("READ");
        assert_eq!(check_plan(&read).unwrap().map(|(k, _)| k), Some(FileOpKind::Read));
        assert!(check_plan(&ActionPlan::default()).unwrap().is_none());
    }

    #[test]
    fn test_check_plan_rejects_unknown_op() {
        let err = check_plan(&file_plan("delete")).unwrap_err();
        assert!(matches!(err, AttemptError::UnsupportedFileOperation(ref op) if op == "delete"));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_check_plan_rejects_missing_code() {
        let plan = ActionPlan {
            requires_execution: true,
            ..Default::default()
        };
        let err = check_plan(&plan).unwrap_err();
        assert!(matches!(err, AttemptError::Reasoning(ReasoningError::InvalidPlan(_))));
    }
}
