// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Taskweave

// Worker Pool Configuration
pub const TASKWEAVE_MAX_CONCURRENCY: &str = "TASKWEAVE_MAX_CONCURRENCY";
pub const TASKWEAVE_SHUTDOWN_GRACE_SECS: &str = "TASKWEAVE_SHUTDOWN_GRACE_SECS";

// Worker Retry Policy
pub const TASKWEAVE_MAX_RETRIES: &str = "TASKWEAVE_MAX_RETRIES";
pub const TASKWEAVE_RETRY_DELAY_MS: &str = "TASKWEAVE_RETRY_DELAY_MS";
pub const TASKWEAVE_TASK_TIMEOUT_SECS: &str = "TASKWEAVE_TASK_TIMEOUT_SECS";
pub const TASKWEAVE_ERROR_LOG_THRESHOLD: &str = "TASKWEAVE_ERROR_LOG_THRESHOLD";

// Sandbox Limits
pub const TASKWEAVE_SANDBOX_MEMORY_MB: &str = "TASKWEAVE_SANDBOX_MEMORY_MB";
pub const TASKWEAVE_SANDBOX_CPU_PERCENT: &str = "TASKWEAVE_SANDBOX_CPU_PERCENT";
pub const TASKWEAVE_SANDBOX_NETWORK_DISABLED: &str = "TASKWEAVE_SANDBOX_NETWORK_DISABLED";
pub const TASKWEAVE_SANDBOX_STOP_GRACE_SECS: &str = "TASKWEAVE_SANDBOX_STOP_GRACE_SECS";

// File Storage
pub const TASKWEAVE_WORKSPACE_ROOT: &str = "TASKWEAVE_WORKSPACE_ROOT";
pub const TASKWEAVE_RESULTS_DIR: &str = "TASKWEAVE_RESULTS_DIR";

// Web Search
pub const SEARCH_API_KEY: &str = "SEARCH_API_KEY";
pub const TASKWEAVE_SEARCH_ENDPOINT: &str = "TASKWEAVE_SEARCH_ENDPOINT";
pub const TASKWEAVE_SEARCH_TIMEOUT_SECS: &str = "TASKWEAVE_SEARCH_TIMEOUT_SECS";
pub const TASKWEAVE_SEARCH_CACHE_MAX_ENTRIES: &str = "TASKWEAVE_SEARCH_CACHE_MAX_ENTRIES";
pub const TASKWEAVE_SEARCH_CACHE_TTL_SECS: &str = "TASKWEAVE_SEARCH_CACHE_TTL_SECS";

// Reasoning Service
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL: &str = "ANTHROPIC_MODEL";
pub const ANTHROPIC_BASE_URL: &str = "ANTHROPIC_BASE_URL";
