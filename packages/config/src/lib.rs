// ABOUTME: Configuration and environment variable management for Taskweave
// ABOUTME: Env var names, strict parsing helpers, and the injectable TaskweaveConfig

pub mod constants;
pub mod env;
pub mod settings;

pub use settings::{
    AiSettings, PoolSettings, SandboxSettings, SearchSettings, StorageSettings, TaskweaveConfig,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Configuration value for {key} out of range: {message}")]
    OutOfRange { key: String, message: String },
}
