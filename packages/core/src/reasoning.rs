// ABOUTME: Contract for the external reasoning service that decides what a task needs
// ABOUTME: Workers call it once per attempt and treat the answer as an opaque plan

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ActionPlan, Task};

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("Reasoning service not configured: {0}")]
    NotConfigured(String),

    #[error("Reasoning service request failed: {0}")]
    Service(String),

    #[error("Reasoning service returned an invalid plan: {0}")]
    InvalidPlan(String),
}

impl ReasoningError {
    /// Configuration problems and malformed plans fail the task outright
    pub fn is_retriable(&self) -> bool {
        matches!(self, ReasoningError::Service(_))
    }
}

/// Decision oracle consulted by workers
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn process_task(&self, task: &Task) -> Result<ActionPlan, ReasoningError>;
}
