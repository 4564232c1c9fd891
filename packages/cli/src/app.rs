// ABOUTME: Wires configuration into the concrete collaborators a distributor needs
// ABOUTME: Docker sandbox, Anthropic reasoning with cached Brave search, and the file store

use anyhow::{Context, Result};
use std::sync::Arc;
use taskweave_ai::{AIService, AnthropicReasoningService};
use taskweave_config::{SandboxSettings, TaskweaveConfig};
use taskweave_core::{ReasoningService, TaskPersistence};
use taskweave_sandbox::{DockerRuntime, SandboxExecutor, SandboxLimits};
use taskweave_search::{BraveSearchClient, SearchCache};
use taskweave_storage::{FileStore, FileTaskPersistence};
use taskweave_tasks::{TaskDistributor, TaskDistributorBuilder};
use tracing::{info, warn};

pub fn sandbox_limits(settings: &SandboxSettings) -> SandboxLimits {
    let cpu_percent = u8::try_from(settings.cpu_percent.min(100)).unwrap_or(100);
    SandboxLimits::new(settings.memory_mb, cpu_percent)
        .with_network_disabled(settings.network_disabled)
        .with_stop_grace_secs(settings.stop_grace_secs)
}

pub fn sandbox_executor(config: &TaskweaveConfig) -> Result<SandboxExecutor> {
    let runtime = DockerRuntime::new().context("Failed to connect to Docker")?;
    Ok(SandboxExecutor::new(
        Arc::new(runtime),
        sandbox_limits(&config.sandbox),
    ))
}

pub fn reasoning_service(config: &TaskweaveConfig) -> Result<AnthropicReasoningService> {
    let ai = AIService::new(
        config.ai.api_key.clone(),
        config.ai.model.clone(),
        config.ai.base_url.clone(),
    )
    .context("Failed to build Anthropic client")?;

    let search = BraveSearchClient::new(
        config.search.api_key.clone(),
        config.search.endpoint.clone(),
        config.search.timeout,
    )
    .context("Failed to build search client")?;
    if !search.has_api_key() {
        info!("BRAVE_API_KEY not set - tasks with a context query will fail");
    }

    let cache = SearchCache::with_limits(
        Arc::new(search),
        config.search.cache_max_entries,
        config.search.cache_ttl,
    );
    Ok(AnthropicReasoningService::new(ai).with_search(Arc::new(cache)))
}

/// Builder preloaded with every production collaborator except persistence
pub fn distributor_builder(
    config: &TaskweaveConfig,
    max_concurrency: usize,
) -> Result<TaskDistributorBuilder> {
    let reasoning: Arc<dyn ReasoningService> = Arc::new(reasoning_service(config)?);
    let executor = Arc::new(sandbox_executor(config)?);

    Ok(TaskDistributor::builder()
        .max_concurrency(max_concurrency)
        .reasoning(reasoning)
        .executor(executor)
        .file_store(Arc::new(FileStore::new(&config.storage.workspace_root)))
        .worker_config(config.worker.clone())
        .shutdown_grace(config.pool.shutdown_grace))
}

pub fn result_store(config: &TaskweaveConfig) -> Arc<dyn TaskPersistence> {
    Arc::new(FileTaskPersistence::new(&config.storage.results_dir))
}

/// Warn early when the runtime is unreachable; the first execution would fail anyway
pub async fn check_docker(executor: &SandboxExecutor) {
    match executor.runtime().is_available().await {
        Ok(true) => {}
        Ok(false) | Err(_) => warn!("Docker is not reachable - code execution tasks will fail"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_limits_follow_settings() {
        let settings = SandboxSettings {
            memory_mb: 512,
            cpu_percent: 250,
            network_disabled: false,
            stop_grace_secs: 2,
        };
        let limits = sandbox_limits(&settings);
        assert_eq!(limits.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(limits.cpu_quota, limits.cpu_period);
        assert!(!limits.network_disabled);
        assert_eq!(limits.stop_grace_secs, 2);
    }
}
