// ABOUTME: Crash-safe file reads and writes rooted at a workspace directory
// ABOUTME: Writes go to a synced sibling temp file and are renamed over the target under a per-path lock

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::locks::LockTable;

const READ_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Error, Debug)]
pub enum FileStoreError {
    #[error("Path escapes the workspace root: {0}")]
    PathOutsideRoot(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File content is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

impl FileStoreError {
    /// Path violations are rejected the same way every time
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            FileStoreError::PathOutsideRoot(_) | FileStoreError::InvalidUtf8(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FileStoreError>;

/// Step at which a test can force a write to fail
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteStage {
    AfterTempWrite,
    BeforeRename,
    BeforeDirSync,
}

/// Atomic file store. Cheap to clone; clones share one lock table.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    locks: LockTable,
    #[cfg(test)]
    fault: Option<WriteStage>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: LockTable::new(),
            #[cfg(test)]
            fault: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    #[cfg(test)]
    pub(crate) fn with_fault(mut self, stage: WriteStage) -> Self {
        self.fault = Some(stage);
        self
    }

    #[cfg(test)]
    fn check_fault(&self, stage: WriteStage) -> std::io::Result<()> {
        if self.fault == Some(stage) {
            return Err(std::io::Error::other(format!("injected failure at {:?}", stage)));
        }
        Ok(())
    }

    /// Resolve `path` under the root, rejecting anything that climbs out of it
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let candidate = Path::new(path);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(FileStoreError::PathOutsideRoot(path.to_string()));
        }

        if candidate.is_absolute() {
            if candidate.starts_with(&self.root) {
                return Ok(candidate.to_path_buf());
            }
            return Err(FileStoreError::PathOutsideRoot(path.to_string()));
        }

        Ok(self.root.join(candidate))
    }

    /// Read a file as UTF-8 text, streaming in fixed-size chunks
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let full_path = self.resolve(path)?;
        let read_err = |source| FileStoreError::Read {
            path: full_path.display().to_string(),
            source,
        };

        let mut file = fs::File::open(&full_path).await.map_err(read_err)?;
        let mut content = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = file.read(&mut chunk).await.map_err(read_err)?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..n]);
        }

        String::from_utf8(content)
            .map_err(|_| FileStoreError::InvalidUtf8(full_path.display().to_string()))
    }

    /// Replace the file at `path` with `content`, or leave it untouched on failure
    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let target = self.resolve(path)?;
        let write_err = |source| FileStoreError::Write {
            path: target.display().to_string(),
            source,
        };

        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).await.map_err(write_err)?;

        let _lock = self.locks.lock(&target).await;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                write_err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no file name",
                ))
            })?;
        let temp_path = parent.join(format!(".{}.{}.tmp", file_name, nanoid::nanoid!(8)));
        let mut temp = TempFileGuard::new(temp_path.clone());

        self.write_temp(&temp_path, content).await.map_err(write_err)?;

        #[cfg(test)]
        self.check_fault(WriteStage::BeforeRename).map_err(write_err)?;

        fs::rename(&temp_path, &target).await.map_err(write_err)?;
        temp.disarm();

        // The rename is only durable once the directory entry is on disk
        self.sync_dir(&parent).await.map_err(write_err)?;

        debug!("Wrote {} bytes to {}", content.len(), target.display());
        Ok(())
    }

    async fn sync_dir(&self, dir: &Path) -> std::io::Result<()> {
        #[cfg(test)]
        self.check_fault(WriteStage::BeforeDirSync)?;

        #[cfg(unix)]
        fs::File::open(dir).await?.sync_all().await?;
        #[cfg(not(unix))]
        let _ = dir;
        Ok(())
    }

    async fn write_temp(&self, temp_path: &Path, content: &str) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp_path)
            .await?;
        file.write_all(content.as_bytes()).await?;

        #[cfg(test)]
        self.check_fault(WriteStage::AfterTempWrite)?;

        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// Removes the temp file on drop unless the rename went through.
/// Covers early returns and futures dropped mid-write.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temp file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp file {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn leftover_temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        store.write_file("notes/today.txt", "hello").await.unwrap();
        assert_eq!(store.read_file("notes/today.txt").await.unwrap(), "hello");
        assert!(leftover_temp_files(&dir.path().join("notes")).is_empty());
    }

    #[tokio::test]
    async fn test_read_spans_multiple_chunks() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let big = "x".repeat(READ_CHUNK_SIZE * 3 + 17);

        store.write_file("big.txt", &big).await.unwrap();
        assert_eq!(store.read_file("big.txt").await.unwrap(), big);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        let err = store.read_file("nope.txt").await.unwrap_err();
        assert!(matches!(err, FileStoreError::Read { .. }));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_failure_after_temp_write_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let original = "original contents";
        std::fs::write(dir.path().join("target.txt"), original).unwrap();

        let store = FileStore::new(dir.path()).with_fault(WriteStage::AfterTempWrite);
        let result = store.write_file("target.txt", "new contents").await;

        assert!(result.is_err());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("target.txt")).unwrap(),
            original
        );
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failure_before_rename_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let original = b"\x00binary\xffbytes";
        std::fs::write(dir.path().join("target.bin"), original).unwrap();

        let store = FileStore::new(dir.path()).with_fault(WriteStage::BeforeRename);
        assert!(store.write_file("target.bin", "replacement").await.is_err());

        assert_eq!(std::fs::read(dir.path().join("target.bin")).unwrap(), original);
        assert!(leftover_temp_files(dir.path()).is_empty());

        // The same write succeeds once the fault is gone
        let store = FileStore::new(dir.path());
        store.write_file("target.bin", "replacement").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("target.bin")).unwrap(),
            "replacement"
        );
    }

    #[tokio::test]
    async fn test_directory_sync_failure_after_rename_is_retriable() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("target.txt"), "old").unwrap();

        let store = FileStore::new(dir.path()).with_fault(WriteStage::BeforeDirSync);
        let err = store.write_file("target.txt", "new").await.unwrap_err();

        assert!(matches!(err, FileStoreError::Write { .. }));
        assert!(err.is_retriable());
        // The rename already happened; only its durability is in doubt
        assert_eq!(
            std::fs::read_to_string(dir.path().join("target.txt")).unwrap(),
            "new"
        );
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_rejects_paths_outside_root() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        let err = store.write_file("../escape.txt", "x").await.unwrap_err();
        assert!(matches!(err, FileStoreError::PathOutsideRoot(_)));
        assert!(!err.is_retriable());

        assert!(store.resolve("/etc/passwd").is_err());
        let inside = dir.path().join("ok.txt");
        assert_eq!(store.resolve(inside.to_str().unwrap()).unwrap(), inside);
    }

    #[tokio::test]
    async fn test_concurrent_writers_same_path() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));

        let writes = (0..16).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let body = format!("writer-{i}-").repeat(1000);
                store.write_file("shared.txt", &body).await.unwrap();
            })
        });
        for handle in futures::future::join_all(writes).await {
            handle.unwrap();
        }

        // Whole content from exactly one writer, never an interleaving
        let content = store.read_file("shared.txt").await.unwrap();
        let prefix = content.split('-').take(2).collect::<Vec<_>>().join("-") + "-";
        assert_eq!(content, prefix.repeat(1000));
        assert!(leftover_temp_files(dir.path()).is_empty());
        assert_eq!(store.locks().active_paths(), 0);
    }
}
