// ABOUTME: Concurrent task distribution for Taskweave
// ABOUTME: Bounded queue, fixed-size worker pool, per-attempt deadlines, and bounded retries

pub mod distributor;
pub mod error;
mod worker;

pub use distributor::{ShutdownSummary, TaskDistributor, TaskDistributorBuilder, BATCH_SIZE};
pub use error::{AttemptError, DistributorError, Result};
pub use worker::WorkerExit;
