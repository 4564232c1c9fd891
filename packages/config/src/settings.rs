// ABOUTME: Explicitly constructed Taskweave configuration
// ABOUTME: Built once from the environment and passed to each component that needs it

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use taskweave_core::WorkerConfig;
use tracing::{debug, info};

use crate::constants::*;
use crate::env::{parse_flag, parse_value};
use crate::ConfigError;

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_concurrency: usize,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSettings {
    pub memory_mb: u64,
    /// Percent of one core
    pub cpu_percent: u32,
    pub network_disabled: bool,
    pub stop_grace_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub workspace_root: PathBuf,
    pub results_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    /// Absent keys are reported when a search is attempted, not at startup
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
    pub cache_max_entries: usize,
    pub cache_ttl: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskweaveConfig {
    pub pool: PoolSettings,
    pub worker: WorkerConfig,
    pub sandbox: SandboxSettings,
    pub storage: StorageSettings,
    pub search: SearchSettings,
    pub ai: AiSettings,
}

impl Default for TaskweaveConfig {
    fn default() -> Self {
        Self {
            pool: PoolSettings {
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            },
            worker: WorkerConfig::default(),
            sandbox: SandboxSettings {
                memory_mb: 256,
                cpu_percent: 50,
                network_disabled: true,
                stop_grace_secs: 5,
            },
            storage: StorageSettings {
                workspace_root: PathBuf::from("./workspace"),
                results_dir: PathBuf::from("./results"),
            },
            search: SearchSettings {
                api_key: None,
                endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
                timeout: Duration::from_secs(10),
                cache_max_entries: 1024,
                cache_ttl: Some(Duration::from_secs(3600)),
            },
            ai: AiSettings {
                api_key: None,
                model: DEFAULT_ANTHROPIC_MODEL.to_string(),
                base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            },
        }
    }
}

impl TaskweaveConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(n) = number::<usize>(&lookup, TASKWEAVE_MAX_CONCURRENCY)? {
            if n == 0 {
                return Err(ConfigError::OutOfRange {
                    key: TASKWEAVE_MAX_CONCURRENCY.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            config.pool.max_concurrency = n;
        }
        if let Some(secs) = number::<u64>(&lookup, TASKWEAVE_SHUTDOWN_GRACE_SECS)? {
            config.pool.shutdown_grace = Duration::from_secs(secs);
        }

        if let Some(n) = number::<u32>(&lookup, TASKWEAVE_MAX_RETRIES)? {
            if n == 0 {
                return Err(ConfigError::OutOfRange {
                    key: TASKWEAVE_MAX_RETRIES.to_string(),
                    message: "must allow at least one attempt".to_string(),
                });
            }
            config.worker.max_retries = n;
        }
        if let Some(ms) = number::<u64>(&lookup, TASKWEAVE_RETRY_DELAY_MS)? {
            config.worker.retry_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = number::<u64>(&lookup, TASKWEAVE_TASK_TIMEOUT_SECS)? {
            if secs == 0 {
                return Err(ConfigError::OutOfRange {
                    key: TASKWEAVE_TASK_TIMEOUT_SECS.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            config.worker.task_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = number::<u32>(&lookup, TASKWEAVE_ERROR_LOG_THRESHOLD)? {
            config.worker.error_log_threshold = n;
        }

        if let Some(mb) = number::<u64>(&lookup, TASKWEAVE_SANDBOX_MEMORY_MB)? {
            config.sandbox.memory_mb = mb;
        }
        if let Some(pct) = number::<u32>(&lookup, TASKWEAVE_SANDBOX_CPU_PERCENT)? {
            if pct == 0 || pct > 100 {
                return Err(ConfigError::OutOfRange {
                    key: TASKWEAVE_SANDBOX_CPU_PERCENT.to_string(),
                    message: "must be between 1 and 100".to_string(),
                });
            }
            config.sandbox.cpu_percent = pct;
        }
        if let Some(disabled) = flag(&lookup, TASKWEAVE_SANDBOX_NETWORK_DISABLED)? {
            config.sandbox.network_disabled = disabled;
        }
        if let Some(secs) = number::<u64>(&lookup, TASKWEAVE_SANDBOX_STOP_GRACE_SECS)? {
            config.sandbox.stop_grace_secs = secs;
        }

        if let Some(root) = non_blank(lookup(TASKWEAVE_WORKSPACE_ROOT)) {
            config.storage.workspace_root = PathBuf::from(root);
        }
        if let Some(dir) = non_blank(lookup(TASKWEAVE_RESULTS_DIR)) {
            config.storage.results_dir = PathBuf::from(dir);
        }

        config.search.api_key = non_blank(lookup(SEARCH_API_KEY));
        if let Some(endpoint) = non_blank(lookup(TASKWEAVE_SEARCH_ENDPOINT)) {
            config.search.endpoint = endpoint;
        }
        if let Some(secs) = number::<u64>(&lookup, TASKWEAVE_SEARCH_TIMEOUT_SECS)? {
            config.search.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = number::<usize>(&lookup, TASKWEAVE_SEARCH_CACHE_MAX_ENTRIES)? {
            config.search.cache_max_entries = n;
        }
        if let Some(secs) = number::<u64>(&lookup, TASKWEAVE_SEARCH_CACHE_TTL_SECS)? {
            // 0 disables expiry
            config.search.cache_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.ai.api_key = non_blank(lookup(ANTHROPIC_API_KEY));
        if let Some(model) = non_blank(lookup(ANTHROPIC_MODEL)) {
            info!("Using custom Anthropic model: {}", model);
            config.ai.model = model;
        }
        if let Some(url) = non_blank(lookup(ANTHROPIC_BASE_URL)) {
            config.ai.base_url = url;
        }

        debug!(
            max_concurrency = config.pool.max_concurrency,
            max_retries = config.worker.max_retries,
            "Loaded Taskweave configuration"
        );

        Ok(config)
    }
}

fn number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    parse_value(key, lookup(key))
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>, ConfigError> {
    parse_flag(key, lookup(key))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
