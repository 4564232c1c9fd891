// ABOUTME: Task model shared by the distributor, workers, and persistence
// ABOUTME: Status state machine, action plans returned by reasoning, and worker policy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::category::TaskCategory;

/// Lifecycle status of a task. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Terminal statuses are never left again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// `Running -> Running` is allowed so retries don't need a detour.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Pending, TaskStatus::Running) => true,
            (TaskStatus::Running, TaskStatus::Running) => true,
            (TaskStatus::Running, TaskStatus::Completed) => true,
            (TaskStatus::Running, TaskStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Task {task_id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// One unit of work. Owned by exactly one worker once dequeued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<TaskCategory>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            language: None,
            context_query: None,
            category: None,
            status: TaskStatus::Pending,
            result: None,
            execution_result: None,
            error: None,
            attempts: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_context_query(mut self, query: impl Into<String>) -> Self {
        self.context_query = Some(query.into());
        self
    }

    /// Move the task to `next`, rejecting backward transitions
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn complete(&mut self, result: String) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(result);
        self.error = None;
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

/// File mutation requested by an action plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperation {
    pub op: String,
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Supported file operations. Anything else is rejected without retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpKind {
    Read,
    Write,
}

impl FileOperation {
    pub fn kind(&self) -> Option<FileOpKind> {
        match self.op.trim().to_ascii_lowercase().as_str() {
            "read" => Some(FileOpKind::Read),
            "write" | "create" | "overwrite" => Some(FileOpKind::Write),
            _ => None,
        }
    }
}

/// Decision returned by the reasoning service for one task attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(default)]
    pub requires_execution: bool,
    #[serde(default)]
    pub generated_code: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub requires_file_operation: bool,
    #[serde(default)]
    pub file_operation: Option<FileOperation>,
    #[serde(default)]
    pub result: String,
}

impl ActionPlan {
    /// Reject plans whose flags ask for work they do not describe
    pub fn validate(&self) -> Result<(), String> {
        if self.requires_execution && self.generated_code.trim().is_empty() {
            return Err("execution requested without generated code".to_string());
        }
        if self.requires_file_operation && self.file_operation.is_none() {
            return Err("file operation requested without details".to_string());
        }
        Ok(())
    }
}

/// Per-worker retry and timeout policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Total attempts before a task is marked failed
    pub max_retries: u32,
    /// Base unit for exponential backoff
    pub retry_delay: Duration,
    /// Deadline for a single attempt
    pub task_timeout: Duration,
    /// Consecutive terminal failures before a worker logs an error diagnostic
    pub error_log_threshold: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            task_timeout: Duration::from_secs(300),
            error_log_threshold: 5,
        }
    }
}

impl WorkerConfig {
    /// Delay to wait after failed attempt `attempt` (0-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.retry_delay.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_forward_transitions() {
        let mut task = Task::new("t1", "say hello");
        assert!(task.transition(TaskStatus::Running).is_ok());
        assert!(task.transition(TaskStatus::Running).is_ok());
        assert!(task.complete("hello".to_string()).is_ok());
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut task = Task::new("t1", "say hello");
        task.transition(TaskStatus::Running).unwrap();
        task.fail("boom").unwrap();

        let err = task.transition(TaskStatus::Pending).unwrap_err();
        assert_eq!(err.from, TaskStatus::Failed);
        assert_eq!(err.to, TaskStatus::Pending);
        assert!(task.transition(TaskStatus::Running).is_err());
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut task = Task::new("t1", "say hello");
        assert!(task.complete("x".to_string()).is_err());
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.result.is_none());
    }

    #[test]
    fn test_file_op_kind() {
        let op = |s: &str| FileOperation {
            op: s.to_string(),
            path: "a.txt".to_string(),
            content: None,
        };
        assert_eq!(op("write").kind(), Some(FileOpKind::Write));
        assert_eq!(op(" READ ").kind(), Some(FileOpKind::Read));
        assert_eq!(op("delete").kind(), None);
    }

    #[test]
    fn test_action_plan_defaults_missing_fields() {
        let plan: ActionPlan =
            serde_json::from_str(r#"{"requires_execution": true, "generated_code": "print(1)"}"#)
                .unwrap();
        assert!(plan.requires_execution);
        assert!(!plan.requires_file_operation);
        assert_eq!(plan.file_operation, None);
        assert_eq!(plan.result, "");
    }

    #[test]
    fn test_backoff_doubles() {
        let config = WorkerConfig {
            retry_delay: Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(config.backoff_for(0), Duration::from_millis(100));
        assert_eq!(config.backoff_for(1), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_task_deserializes_with_defaults() {
        let task: Task =
            serde_json::from_str(r#"{"id": "abc", "description": "do it"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert!(task.language.is_none());
    }

    #[test]
    fn test_plan_validation() {
        assert!(ActionPlan::default().validate().is_ok());

        let no_code = ActionPlan {
            requires_execution: true,
            ..Default::default()
        };
        assert!(no_code.validate().is_err());

        let no_file = ActionPlan {
            requires_file_operation: true,
            ..Default::default()
        };
        assert!(no_file.validate().is_err());
    }
}
