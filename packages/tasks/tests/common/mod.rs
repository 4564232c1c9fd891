// ABOUTME: Shared fakes for distributor integration tests
// ABOUTME: Scripted reasoning, a recording executor, and persistence probes

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskweave_core::{
    ActionPlan, MemoryPersistence, PersistenceError, ReasoningError, ReasoningService, Task,
    TaskPersistence, WorkerConfig,
};
use taskweave_sandbox::{CodeExecutor, ExecutorError, Language};
use taskweave_storage::FileStore;
use taskweave_tasks::{TaskDistributor, TaskDistributorBuilder};
use tokio::time::Instant;

type Script = dyn Fn(&Task, u32) -> Result<ActionPlan, ReasoningError> + Send + Sync;

/// Reasoning service driven by a closure of (task, 1-based call number for that task)
pub struct ScriptedReasoning {
    script: Box<Script>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<String, u32>>,
    call_times: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedReasoning {
    pub fn new(
        script: impl Fn(&Task, u32) -> Result<ActionPlan, ReasoningError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            delay: None,
            calls: Mutex::new(HashMap::new()),
            call_times: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every call answers with a plain text result
    pub fn answering(result: &str) -> Self {
        let result = result.to_string();
        Self::new(move |_, _| Ok(text_plan(&result)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls_for(&self, task_id: &str) -> u32 {
        self.calls.lock().unwrap().get(task_id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn call_times_for(&self, task_id: &str) -> Vec<Instant> {
        self.call_times
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn process_task(&self, task: &Task) -> Result<ActionPlan, ReasoningError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(task.id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.call_times
            .lock()
            .unwrap()
            .push((task.id.clone(), Instant::now()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.script)(task, call)
    }
}

/// Records every execution and answers with `ran <language>: <source>`
#[derive(Default)]
pub struct RecordingExecutor {
    pub runs: Mutex<Vec<(String, String)>>,
}

impl RecordingExecutor {
    pub fn runs(&self) -> Vec<(String, String)> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeExecutor for RecordingExecutor {
    async fn execute_code(
        &self,
        source: &str,
        language: &str,
        _deadline: Instant,
    ) -> Result<String, ExecutorError> {
        let parsed: Language = language.parse()?;
        self.runs
            .lock()
            .unwrap()
            .push((parsed.name().to_string(), source.to_string()));
        Ok(format!("ran {}: {}", parsed.name(), source))
    }
}

/// Times out the first `failures` executions, then answers like `RecordingExecutor`
pub struct FlakyExecutor {
    failures: u32,
    calls: AtomicUsize,
}

impl FlakyExecutor {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeExecutor for FlakyExecutor {
    async fn execute_code(
        &self,
        _source: &str,
        language: &str,
        _deadline: Instant,
    ) -> Result<String, ExecutorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures as usize {
            return Err(ExecutorError::Timeout);
        }
        Ok(format!("{} output", language))
    }
}

/// Records the task and then reports a storage failure
#[derive(Default)]
pub struct FailingPersistence {
    pub seen: Mutex<Vec<Task>>,
}

impl FailingPersistence {
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskPersistence for FailingPersistence {
    async fn persist(&self, task: &Task) -> Result<(), PersistenceError> {
        self.seen.lock().unwrap().push(task.clone());
        Err(PersistenceError {
            task_id: task.id.clone(),
            reason: "disk full".to_string(),
        })
    }
}

pub fn text_plan(result: &str) -> ActionPlan {
    ActionPlan {
        result: result.to_string(),
        ..Default::default()
    }
}

pub fn code_plan(code: &str, language: Option<&str>) -> ActionPlan {
    ActionPlan {
        requires_execution: true,
        generated_code: code.to_string(),
        language: language.map(str::to_string),
        ..Default::default()
    }
}

pub fn fast_config(max_retries: u32) -> WorkerConfig {
    WorkerConfig {
        max_retries,
        retry_delay: Duration::from_millis(5),
        task_timeout: Duration::from_secs(5),
        error_log_threshold: 2,
    }
}

pub fn tasks(prefix: &str, n: usize) -> Vec<Task> {
    (0..n)
        .map(|i| Task::new(format!("{}-{}", prefix, i), format!("task number {}", i)))
        .collect()
}

pub fn builder(
    concurrency: usize,
    reasoning: Arc<dyn ReasoningService>,
    store: FileStore,
) -> TaskDistributorBuilder {
    TaskDistributor::builder()
        .max_concurrency(concurrency)
        .reasoning(reasoning)
        .executor(Arc::new(RecordingExecutor::default()))
        .file_store(Arc::new(store))
        .worker_config(fast_config(3))
}

/// Wait until `n` terminal records have been persisted
pub async fn wait_for_records(persistence: &MemoryPersistence, n: usize) -> Vec<Task> {
    tokio::time::timeout(Duration::from_secs(30), async {
        while persistence.len() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for task records");
    persistence.records()
}
