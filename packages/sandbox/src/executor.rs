// ABOUTME: Runs one source file per fresh container under CPU and memory ceilings
// ABOUTME: Every container created here is stopped and removed before execute returns

use crate::languages::{Language, LanguageSpec, UnsupportedLanguage, WORK_DIR};
use crate::providers::{ContainerConfig, ContainerRuntime, RuntimeError, SourceFile, StreamType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

const DEFAULT_MEMORY_MB: i64 = 256;
const DEFAULT_CPU_PERIOD: i64 = 100_000;
const DEFAULT_CPU_PERCENT: i64 = 50;
const DEFAULT_STOP_GRACE_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    UnsupportedLanguage(#[from] UnsupportedLanguage),

    #[error("Sandbox runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Execution exceeded its deadline")]
    Timeout,
}

impl ExecutorError {
    pub fn is_retriable(&self) -> bool {
        !matches!(self, ExecutorError::UnsupportedLanguage(_))
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Resource ceilings applied to every sandbox container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    pub memory_bytes: i64,
    pub cpu_period: i64,
    pub cpu_quota: i64,
    pub network_disabled: bool,
    pub auto_remove: bool,
    pub stop_grace_secs: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_MB as u64, DEFAULT_CPU_PERCENT as u8)
    }
}

impl SandboxLimits {
    /// `cpu_percent` is a share of one core
    pub fn new(memory_mb: u64, cpu_percent: u8) -> Self {
        Self {
            memory_bytes: (memory_mb as i64).saturating_mul(1024 * 1024),
            cpu_period: DEFAULT_CPU_PERIOD,
            cpu_quota: DEFAULT_CPU_PERIOD * i64::from(cpu_percent) / 100,
            network_disabled: true,
            auto_remove: true,
            stop_grace_secs: DEFAULT_STOP_GRACE_SECS,
        }
    }

    pub fn with_network_disabled(mut self, disabled: bool) -> Self {
        self.network_disabled = disabled;
        self
    }

    pub fn with_stop_grace_secs(mut self, secs: u64) -> Self {
        self.stop_grace_secs = secs;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language: Language,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Combined stdout and stderr in arrival order
    pub output: String,
    /// `None` when the container was gone before its exit code could be read
    pub exit_code: Option<i64>,
}

/// The seam workers depend on for running generated code
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Run `source` as `language` and return its combined output.
    ///
    /// The deadline is enforced inside so cleanup still happens when it
    /// passes. Callers should not wrap this in their own timeout.
    async fn execute_code(&self, source: &str, language: &str, deadline: Instant)
        -> Result<String>;
}

pub struct SandboxExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    limits: SandboxLimits,
}

impl SandboxExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, limits: SandboxLimits) -> Self {
        Self { runtime, limits }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    fn container_config(&self, language: Language, spec: &LanguageSpec) -> ContainerConfig {
        let mut labels = HashMap::new();
        labels.insert(
            "taskweave.sandbox.language".to_string(),
            language.name().to_string(),
        );

        ContainerConfig {
            image: spec.image.to_string(),
            name: format!("taskweave-{}-{}", language.name(), nanoid::nanoid!(10)),
            command: spec.command.clone(),
            working_dir: WORK_DIR.to_string(),
            memory_bytes: self.limits.memory_bytes,
            cpu_period: self.limits.cpu_period,
            cpu_quota: self.limits.cpu_quota,
            network_disabled: self.limits.network_disabled,
            auto_remove: self.limits.auto_remove,
            labels,
        }
    }

    /// Run one request in a fresh container and tear it down afterwards
    pub async fn run(&self, request: &ExecutionRequest, deadline: Instant) -> Result<ExecutionOutput> {
        if Instant::now() >= deadline {
            return Err(ExecutorError::Timeout);
        }

        let spec = request.language.spec();
        timeout_at(deadline, self.runtime.ensure_image(spec.image))
            .await
            .map_err(|_| ExecutorError::Timeout)??;

        // Creation is never cut short: a container that exists must have its
        // id in hand so cleanup can find it.
        let config = self.container_config(request.language, &spec);
        let container_id = self.runtime.create_container(&config).await?;
        debug!(
            container_id = %container_id,
            language = %request.language,
            "Created sandbox container"
        );

        let outcome = match timeout_at(
            deadline,
            self.run_container(&container_id, &spec, &request.source),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(container_id = %container_id, "Sandbox execution timed out");
                Err(ExecutorError::Timeout)
            }
        };

        self.cleanup(&container_id).await;
        outcome
    }

    async fn run_container(
        &self,
        container_id: &str,
        spec: &LanguageSpec,
        source: &str,
    ) -> Result<ExecutionOutput> {
        let files = [SourceFile {
            name: spec.file_name.to_string(),
            contents: source.as_bytes().to_vec(),
        }];
        self.runtime
            .copy_to_container(container_id, WORK_DIR, &files)
            .await?;

        // Attach before start so output is captured even if the container is
        // auto-removed the moment it exits.
        let mut stream = self.runtime.attach_output(container_id).await?;
        self.runtime.start_container(container_id).await?;

        let exit_code = self.runtime.wait_container(container_id).await?;

        let mut output = Vec::new();
        while let Some(chunk) = stream.receiver.recv().await {
            if chunk.stream == StreamType::Stderr {
                debug!(container_id, bytes = chunk.data.len(), "stderr chunk");
            }
            output.extend_from_slice(&chunk.data);
        }

        match exit_code {
            Some(0) => {}
            Some(code) => debug!(container_id, code, "Sandbox program exited non-zero"),
            None => debug!(container_id, "Sandbox container removed before exit code was read"),
        }

        Ok(ExecutionOutput {
            output: String::from_utf8_lossy(&output).into_owned(),
            exit_code,
        })
    }

    /// Stop then force-remove. Failures are logged and never replace the
    /// result of the run itself.
    async fn cleanup(&self, container_id: &str) {
        match self
            .runtime
            .stop_container(container_id, self.limits.stop_grace_secs)
            .await
        {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => warn!(container_id, "Failed to stop sandbox container: {}", e),
        }

        match self.runtime.remove_container(container_id, true).await {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {
                debug!(container_id, "Sandbox container cleaned up");
            }
            Err(e) => warn!(container_id, "Failed to remove sandbox container: {}", e),
        }
    }
}

#[async_trait]
impl CodeExecutor for SandboxExecutor {
    async fn execute_code(
        &self,
        source: &str,
        language: &str,
        deadline: Instant,
    ) -> Result<String> {
        let request = ExecutionRequest {
            language: language.parse()?,
            source: source.to_string(),
        };
        Ok(self.run(&request, deadline).await?.output)
    }
}
