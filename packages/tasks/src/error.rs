// ABOUTME: Error types for task submission and single task attempts
// ABOUTME: Attempt errors classify themselves as retriable or terminal for the retry loop

use std::time::Duration;

use taskweave_core::ReasoningError;
use taskweave_sandbox::ExecutorError;
use taskweave_storage::FileStoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DistributorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task queue is full: rejected task {task_id} after enqueueing {enqueued}")]
    QueueFull { task_id: String, enqueued: usize },

    #[error("Distributor already started")]
    AlreadyStarted,

    #[error("Distributor is stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, DistributorError>;

/// Why one attempt at a task failed
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    #[error(transparent)]
    Execution(#[from] ExecutorError),

    #[error(transparent)]
    File(#[from] FileStoreError),

    #[error("Unsupported file operation: {0}")]
    UnsupportedFileOperation(String),

    #[error("Attempt exceeded its {0:?} deadline")]
    Timeout(Duration),
}

impl AttemptError {
    pub fn is_retriable(&self) -> bool {
        match self {
            AttemptError::Reasoning(e) => e.is_retriable(),
            AttemptError::Execution(e) => e.is_retriable(),
            AttemptError::File(e) => e.is_retriable(),
            AttemptError::UnsupportedFileOperation(_) => false,
            AttemptError::Timeout(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_sandbox::UnsupportedLanguage;

    #[test]
    fn test_retriable_classification() {
        assert!(AttemptError::Timeout(Duration::from_secs(1)).is_retriable());
        assert!(AttemptError::Reasoning(ReasoningError::Service("503".into())).is_retriable());
        assert!(AttemptError::Execution(ExecutorError::Timeout).is_retriable());

        assert!(!AttemptError::UnsupportedFileOperation("delete".into()).is_retriable());
        assert!(!AttemptError::Reasoning(ReasoningError::NotConfigured("key".into())).is_retriable());
        assert!(!AttemptError::Reasoning(ReasoningError::InvalidPlan("empty".into())).is_retriable());
        assert!(!AttemptError::Execution(ExecutorError::UnsupportedLanguage(
            UnsupportedLanguage("cobol".into())
        ))
        .is_retriable());
        assert!(!AttemptError::File(FileStoreError::PathOutsideRoot("../x".into())).is_retriable());
    }

    #[test]
    fn test_queue_full_message() {
        let err = DistributorError::QueueFull {
            task_id: "t-9".to_string(),
            enqueued: 8,
        };
        assert_eq!(
            err.to_string(),
            "Task queue is full: rejected task t-9 after enqueueing 8"
        );
    }
}
