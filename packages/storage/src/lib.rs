// ABOUTME: File storage layer for Taskweave
// ABOUTME: Atomic lock-protected file store and file-backed task persistence

pub mod file_store;
pub mod locks;
pub mod persistence;

pub use file_store::{FileStore, FileStoreError};
pub use locks::{LockTable, PathLockGuard};
pub use persistence::FileTaskPersistence;
