// ABOUTME: Sandboxed multi-language code execution on top of a container runtime
// ABOUTME: Exposes the language dispatch table, the Docker runtime, and the executor seam used by workers

pub mod executor;
pub mod languages;
pub mod providers;

pub use executor::{
    CodeExecutor, ExecutionOutput, ExecutionRequest, ExecutorError, SandboxExecutor, SandboxLimits,
};
pub use languages::{EntrypointKind, Language, LanguageSpec, UnsupportedLanguage, WORK_DIR};
pub use providers::{
    ContainerConfig, ContainerRuntime, DockerRuntime, OutputChunk, OutputStream, RuntimeError,
    SourceFile, StreamType,
};
