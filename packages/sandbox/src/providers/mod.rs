// ABOUTME: Container runtime trait and shared types for sandbox execution backends
// ABOUTME: Defines the create/copy/attach/start/wait/stop/remove lifecycle used per execution

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod docker;

pub use docker::DockerRuntime;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Container error: {0}")]
    ContainerError(String),

    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Container configuration for one execution environment
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub image: String,
    pub name: String,
    pub command: Vec<String>,
    pub working_dir: String,
    pub memory_bytes: i64,
    pub cpu_period: i64,
    pub cpu_quota: i64,
    pub network_disabled: bool,
    pub auto_remove: bool,
    pub labels: HashMap<String, String>,
}

/// A file placed into the container before it starts
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Output collected from a container's attached streams
pub struct OutputStream {
    pub receiver: tokio::sync::mpsc::UnboundedReceiver<OutputChunk>,
}

#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub stream: StreamType,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamType {
    Stdout,
    Stderr,
}

/// Lifecycle operations over isolated execution environments.
///
/// Implementations are shared across workers, so every method takes `&self`
/// and must be safe to call concurrently for different containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check if the runtime is reachable
    async fn is_available(&self) -> Result<bool>;

    /// Make sure the image exists locally, pulling it if needed
    async fn ensure_image(&self, image: &str) -> Result<()>;

    /// Create (but do not start) a container, returning its ID
    async fn create_container(&self, config: &ContainerConfig) -> Result<String>;

    /// Copy files into `dest_dir` inside the container
    async fn copy_to_container(
        &self,
        container_id: &str,
        dest_dir: &str,
        files: &[SourceFile],
    ) -> Result<()>;

    /// Attach to stdout/stderr. Chunks keep flowing until the container exits.
    async fn attach_output(&self, container_id: &str) -> Result<OutputStream>;

    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Wait for the container to stop running.
    ///
    /// Returns `None` when the container was removed before its exit code
    /// could be read (auto-removal can race the wait).
    async fn wait_container(&self, container_id: &str) -> Result<Option<i64>>;

    /// Stop a container, giving it `timeout_secs` before it is killed
    async fn stop_container(&self, container_id: &str, timeout_secs: u64) -> Result<()>;

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;

    /// Number of containers this runtime created that still exist
    async fn count_managed(&self) -> Result<usize>;
}
