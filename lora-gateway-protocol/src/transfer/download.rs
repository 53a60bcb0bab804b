//! Download reassembly and storage
//!
//! A [`DownloadSession`] opens on `[FILE_START:name:size]`, collects exactly
//! `size` raw bytes and is handed to a [`FileSink`] once `[FILE_END]` closes
//! it. Sessions never outlive their connection.

use crate::fs_utils::{ensure_dir, local_file_name, unique_path, write_file_safe};
use crate::{ProtocolError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Preallocation cap for a session buffer
const MAX_PREALLOCATION: usize = 1024 * 1024;

/// In-flight download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSession {
    target_name: String,
    expected_size: u64,
    accumulated: Vec<u8>,
}

impl DownloadSession {
    /// Open a session for `expected_size` bytes of `target_name`
    pub fn new(target_name: impl Into<String>, expected_size: u64) -> Self {
        let capacity = usize::try_from(expected_size)
            .unwrap_or(MAX_PREALLOCATION)
            .min(MAX_PREALLOCATION);
        Self {
            target_name: target_name.into(),
            expected_size,
            accumulated: Vec::with_capacity(capacity),
        }
    }

    /// Device-side name announced by `FILE_START`
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Size announced by `FILE_START`
    pub fn expected_size(&self) -> u64 {
        self.expected_size
    }

    /// Bytes collected so far
    pub fn received(&self) -> u64 {
        self.accumulated.len() as u64
    }

    /// Bytes still missing
    pub fn remaining(&self) -> u64 {
        self.expected_size.saturating_sub(self.received())
    }

    /// Whether the announced size has been reached
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Append raw payload
    pub fn append(&mut self, bytes: &[u8]) {
        self.accumulated.extend_from_slice(bytes);
    }

    /// Whether the collected bytes end with `suffix`
    pub fn ends_with(&self, suffix: &[u8]) -> bool {
        self.accumulated.ends_with(suffix)
    }

    /// Consume the session into name and payload
    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.target_name, self.accumulated)
    }
}

/// Destination of finished downloads
#[async_trait]
pub trait FileSink: Send + Sync + Debug {
    /// Persist one finished download, returning where it was stored
    async fn store(&self, name: &str, data: Vec<u8>) -> Result<String>;
}

/// Writes downloads into a directory
///
/// Only the final component of the device path is used, so device names
/// cannot escape the directory. Existing files are never overwritten.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Store downloads under `dir`, created on first use
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl FileSink for DirectorySink {
    async fn store(&self, name: &str, data: Vec<u8>) -> Result<String> {
        let file_name = local_file_name(name).ok_or_else(|| {
            ProtocolError::InvalidFrame(format!("download name '{}' has no file component", name))
        })?;

        ensure_dir(&self.dir).await?;
        let path = unique_path(&self.dir, &file_name).await;
        write_file_safe(&path, &data).await?;

        info!("Stored {} ({} bytes) at {}", name, data.len(), path.display());
        Ok(path.display().to_string())
    }
}

/// Keeps downloads in memory, keyed by device name
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of a stored download
    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.read().await.get(name).cloned()
    }

    /// Names of all stored downloads
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl FileSink for MemorySink {
    async fn store(&self, name: &str, data: Vec<u8>) -> Result<String> {
        debug!("Keeping {} ({} bytes) in memory", name, data.len());
        self.files.write().await.insert(name.to_string(), data);
        Ok(format!("memory:{}", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_progress() {
        let mut session = DownloadSession::new("report.bin", 5);
        assert_eq!(session.remaining(), 5);
        session.append(b"abc");
        assert_eq!(session.received(), 3);
        assert!(!session.is_complete());
        session.append(b"de");
        assert!(session.is_complete());
        assert!(session.ends_with(b"de"));

        let (name, data) = session.into_parts();
        assert_eq!(name, "report.bin");
        assert_eq!(data, b"abcde");
    }

    #[test]
    fn test_empty_session_is_complete() {
        assert!(DownloadSession::new("empty.txt", 0).is_complete());
    }

    #[tokio::test]
    async fn test_directory_sink_uses_final_component() {
        let temp = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp.path().join("downloads"));

        let location = sink.store("/../../etc/passwd", b"x".to_vec()).await.unwrap();
        let expected = temp.path().join("downloads").join("passwd");
        assert_eq!(location, expected.display().to_string());
        assert_eq!(std::fs::read(expected).unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_directory_sink_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp.path());

        sink.store("/log.txt", b"first".to_vec()).await.unwrap();
        let second = sink.store("/log.txt", b"second".to_vec()).await.unwrap();

        assert!(second.ends_with("log (1).txt"));
        assert_eq!(std::fs::read(temp.path().join("log.txt")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_directory_sink_rejects_nameless_path() {
        let temp = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp.path());
        assert!(sink.store("/", Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let sink = MemorySink::new();
        let location = sink.store("/a.bin", vec![1, 2]).await.unwrap();
        assert_eq!(location, "memory:/a.bin");
        assert_eq!(sink.get("/a.bin").await, Some(vec![1, 2]));
        assert_eq!(sink.names().await, vec!["/a.bin".to_string()]);
    }
}
