// ABOUTME: Task distributor owning the bounded queue and the worker pool behind it
// ABOUTME: Submission fails fast when the queue is full; stop drains workers within a grace period

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use taskweave_core::{
    Categorizer, NoopPersistence, ReasoningService, Task, TaskPersistence, TaskStatus,
    WorkerConfig,
};
use taskweave_sandbox::CodeExecutor;
use taskweave_storage::FileStore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{DistributorError, Result};
use crate::worker::{SharedQueue, Worker, WorkerContext, WorkerExit};

pub const BATCH_SIZE: usize = 10;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// What `stop` observed while draining the pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Workers that exited because the queue closed
    pub drained: usize,
    /// Workers that exited because the pool was cancelled
    pub cancelled: usize,
    /// Workers whose task panicked
    pub panicked: usize,
    /// Workers still running when the grace period ran out
    pub abandoned: usize,
    pub grace_elapsed: bool,
    /// Ids of tasks still queued at shutdown; they never reached a worker
    pub undelivered: Vec<String>,
}

enum PoolState {
    Idle,
    Running(Vec<JoinHandle<WorkerExit>>),
    Stopped,
}

#[derive(Default)]
pub struct TaskDistributorBuilder {
    max_concurrency: Option<usize>,
    reasoning: Option<Arc<dyn ReasoningService>>,
    executor: Option<Arc<dyn CodeExecutor>>,
    file_store: Option<Arc<FileStore>>,
    persistence: Option<Arc<dyn TaskPersistence>>,
    worker_config: Option<WorkerConfig>,
    shutdown_grace: Option<Duration>,
    categorizer: Option<Categorizer>,
}

impl TaskDistributorBuilder {
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    pub fn reasoning(mut self, reasoning: Arc<dyn ReasoningService>) -> Self {
        self.reasoning = Some(reasoning);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn CodeExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn file_store(mut self, file_store: Arc<FileStore>) -> Self {
        self.file_store = Some(file_store);
        self
    }

    /// Defaults to discarding results
    pub fn persistence(mut self, persistence: Arc<dyn TaskPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_config = Some(config);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    pub fn categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = Some(categorizer);
        self
    }

    pub fn build(self) -> Result<TaskDistributor> {
        let max_concurrency = match self.max_concurrency {
            Some(n) if n > 0 => n,
            Some(_) => {
                return Err(DistributorError::InvalidArgument(
                    "max_concurrency must be greater than zero".to_string(),
                ))
            }
            None => {
                return Err(DistributorError::InvalidArgument(
                    "max_concurrency is required".to_string(),
                ))
            }
        };
        let reasoning = self.reasoning.ok_or_else(|| missing("reasoning service"))?;
        let executor = self.executor.ok_or_else(|| missing("executor"))?;
        let file_store = self.file_store.ok_or_else(|| missing("file store"))?;

        let config = self.worker_config.unwrap_or_default();
        if config.max_retries == 0 {
            return Err(DistributorError::InvalidArgument(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if config.task_timeout.is_zero() {
            return Err(DistributorError::InvalidArgument(
                "task_timeout must be greater than zero".to_string(),
            ));
        }

        let queue_capacity = max_concurrency * 2;
        let (sender, receiver) = mpsc::channel(queue_capacity);

        Ok(TaskDistributor {
            max_concurrency,
            queue_capacity,
            shutdown_grace: self.shutdown_grace.unwrap_or(DEFAULT_SHUTDOWN_GRACE),
            categorizer: self.categorizer.unwrap_or_default(),
            context: Arc::new(WorkerContext {
                reasoning,
                executor,
                file_store,
                persistence: self
                    .persistence
                    .unwrap_or_else(|| Arc::new(NoopPersistence)),
                config,
            }),
            sender: Mutex::new(Some(sender)),
            queue: Arc::new(tokio::sync::Mutex::new(receiver)),
            state: Mutex::new(PoolState::Idle),
        })
    }
}

fn missing(what: &str) -> DistributorError {
    DistributorError::InvalidArgument(format!("{} is required", what))
}

/// Poisoning only means another thread panicked mid-update; the state is still usable
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct TaskDistributor {
    max_concurrency: usize,
    queue_capacity: usize,
    shutdown_grace: Duration,
    categorizer: Categorizer,
    context: Arc<WorkerContext>,
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    queue: SharedQueue,
    state: Mutex<PoolState>,
}

impl TaskDistributor {
    pub fn builder() -> TaskDistributorBuilder {
        TaskDistributorBuilder::default()
    }

    /// Distributor with default worker policy, no persistence, and a 30s shutdown grace
    pub fn new(
        max_concurrency: usize,
        reasoning: Arc<dyn ReasoningService>,
        executor: Arc<dyn CodeExecutor>,
        file_store: Arc<FileStore>,
    ) -> Result<Self> {
        Self::builder()
            .max_concurrency(max_concurrency)
            .reasoning(reasoning)
            .executor(executor)
            .file_store(file_store)
            .build()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Tasks waiting in the queue. Reads zero once the distributor is stopped.
    pub fn queued(&self) -> usize {
        lock(&self.sender)
            .as_ref()
            .map(|s| self.queue_capacity - s.capacity())
            .unwrap_or(0)
    }

    pub fn is_running(&self) -> bool {
        matches!(*lock(&self.state), PoolState::Running(_))
    }

    /// Spawn the workers and return immediately. Cancelling `shutdown` makes
    /// idle workers exit; attempts already in progress run to their own deadline.
    pub fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let mut state = lock(&self.state);
        match *state {
            PoolState::Idle => {}
            PoolState::Running(_) => return Err(DistributorError::AlreadyStarted),
            PoolState::Stopped => return Err(DistributorError::Stopped),
        }

        let handles = (0..self.max_concurrency)
            .map(|id| {
                let worker = Worker::new(id, Arc::clone(&self.context));
                tokio::spawn(worker.run(Arc::clone(&self.queue), shutdown.clone()))
            })
            .collect();
        *state = PoolState::Running(handles);

        info!(
            workers = self.max_concurrency,
            queue_capacity = self.queue_capacity,
            "Task distributor started"
        );
        Ok(())
    }

    /// Enqueue tasks in batches without blocking.
    ///
    /// Fails with `QueueFull` on the first task that does not fit; tasks
    /// before it stay enqueued and the rest are not attempted.
    pub fn distribute_tasks(&self, tasks: Vec<Task>) -> Result<usize> {
        let sender = lock(&self.sender)
            .clone()
            .ok_or(DistributorError::Stopped)?;

        if let Some(task) = tasks.iter().find(|t| t.status != TaskStatus::Pending) {
            return Err(DistributorError::InvalidArgument(format!(
                "task {} is {}, only pending tasks can be submitted",
                task.id, task.status
            )));
        }

        let total = tasks.len();
        let mut enqueued = 0;
        let mut tasks = tasks.into_iter().peekable();

        while tasks.peek().is_some() {
            for mut task in tasks.by_ref().take(BATCH_SIZE) {
                if task.category.is_none() {
                    task.category = Some(self.categorizer.categorize(&task.description));
                }
                let task_id = task.id.clone();

                match sender.try_send(task) {
                    Ok(()) => {
                        debug!(task_id = %task_id, "Task enqueued");
                        enqueued += 1;
                    }
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            task_id = %task_id,
                            enqueued,
                            total,
                            "Task queue full, rejecting submission"
                        );
                        return Err(DistributorError::QueueFull { task_id, enqueued });
                    }
                    Err(TrySendError::Closed(_)) => return Err(DistributorError::Stopped),
                }
            }
        }

        Ok(enqueued)
    }

    /// Close the queue and wait for workers to finish, up to the grace period.
    /// Workers still busy when it runs out are left to finish on their own.
    pub async fn stop(&self) -> ShutdownSummary {
        // Dropping the only sender closes the queue once it drains
        drop(lock(&self.sender).take());

        let handles = match std::mem::replace(&mut *lock(&self.state), PoolState::Stopped) {
            PoolState::Running(handles) => handles,
            PoolState::Idle | PoolState::Stopped => {
                return ShutdownSummary {
                    undelivered: self.drain_queue(),
                    ..Default::default()
                }
            }
        };

        info!(workers = handles.len(), "Stopping task distributor");
        let deadline = Instant::now() + self.shutdown_grace;
        let mut summary = ShutdownSummary::default();

        for mut handle in handles {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(WorkerExit::QueueClosed)) => summary.drained += 1,
                Ok(Ok(WorkerExit::Cancelled)) => summary.cancelled += 1,
                Ok(Err(e)) => {
                    error!("Worker terminated abnormally: {}", e);
                    summary.panicked += 1;
                }
                Err(_) => {
                    summary.grace_elapsed = true;
                    summary.abandoned += 1;
                }
            }
        }

        if summary.grace_elapsed {
            warn!(
                abandoned = summary.abandoned,
                grace = ?self.shutdown_grace,
                "Shutdown grace period elapsed with workers still running"
            );
        } else {
            info!("Task distributor stopped");
        }

        summary.undelivered = self.drain_queue();
        summary
    }

    /// Empty the closed queue. Skipped if an abandoned worker still holds the receiver.
    fn drain_queue(&self) -> Vec<String> {
        let Ok(mut receiver) = self.queue.try_lock() else {
            warn!("Task queue still in use by a worker, leaving it undrained");
            return Vec::new();
        };

        let mut undelivered = Vec::new();
        while let Ok(task) = receiver.try_recv() {
            undelivered.push(task.id);
        }
        if !undelivered.is_empty() {
            warn!(
                count = undelivered.len(),
                "Discarding queued tasks that never reached a worker"
            );
        }
        undelivered
    }
}
