// ABOUTME: Core types and collaborator contracts for Taskweave
// ABOUTME: Foundational package shared by the worker pool, executor, and storage packages

pub mod category;
pub mod persistence;
pub mod reasoning;
pub mod types;
pub mod utils;

pub use category::{Categorizer, TaskCategory};
pub use persistence::{MemoryPersistence, NoopPersistence, PersistenceError, TaskPersistence};
pub use reasoning::{ReasoningError, ReasoningService};
pub use types::{
    ActionPlan, FileOpKind, FileOperation, InvalidTransition, Task, TaskStatus, WorkerConfig,
};
pub use utils::generate_task_id;
