//! File system helpers for storing downloaded gateway files
//!
//! Every failure is mapped onto a [`ProtocolError`] so download sinks can
//! report storage problems through the same channel as protocol errors.

use crate::{ProtocolError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Reduce a device-side path to a local file name
///
/// Only the final path component survives, so `/logs/../../etc/passwd`
/// becomes `passwd`. Returns `None` when nothing usable remains.
///
/// ```rust
/// use lora_gateway_protocol::fs_utils::local_file_name;
///
/// assert_eq!(local_file_name("/data/report.bin").as_deref(), Some("report.bin"));
/// assert_eq!(local_file_name("/"), None);
/// ```
pub fn local_file_name(device_name: &str) -> Option<String> {
    device_name
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .filter(|part| *part != "." && *part != "..")
        .map(str::to_string)
}

/// Ensure a directory exists, creating it and its parents if necessary
///
/// # Errors
///
/// Returns `PermissionDenied` if creation fails due to permissions.
/// Returns `Io` for other filesystem errors.
pub async fn ensure_dir(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();

    if fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(());
    }

    debug!("Creating directory: {}", dir.display());
    fs::create_dir_all(dir).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ProtocolError::PermissionDenied(format!(
                "Cannot create directory {}: permission denied",
                dir.display()
            ))
        } else {
            ProtocolError::from_io_error(e, &format!("creating directory {}", dir.display()))
        }
    })
}

/// Write a whole file, creating its parent directory first
///
/// A partially written file is removed before the error is returned.
///
/// # Errors
///
/// - `PermissionDenied` for permission errors
/// - `ResourceExhausted` for disk full
/// - `Io` for other errors
pub async fn write_file_safe(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }

    let mut file = fs::File::create(path)
        .await
        .map_err(|e| map_write_error(e, path, "creating"))?;

    let written = async {
        file.write_all(data).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        cleanup_partial_file(path).await;
        return Err(map_write_error(e, path, "writing"));
    }

    debug!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

fn map_write_error(e: std::io::Error, path: &Path, action: &str) -> ProtocolError {
    let message = e.to_string().to_lowercase();
    if message.contains("no space") || message.contains("disk full") {
        return ProtocolError::ResourceExhausted(format!(
            "Disk full while {} {}",
            action,
            path.display()
        ));
    }
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => ProtocolError::PermissionDenied(format!(
            "Cannot write {}: permission denied",
            path.display()
        )),
        _ => ProtocolError::from_io_error(e, &format!("{} {}", action, path.display())),
    }
}

/// Clean up partial file on error
///
/// Attempts to delete a partially written file. Logs errors but doesn't fail.
pub async fn cleanup_partial_file(path: impl AsRef<Path>) {
    let path = path.as_ref();

    match fs::remove_file(path).await {
        Ok(()) => debug!("Cleaned up partial file: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to clean up partial file {}: {}", path.display(), e),
    }
}

/// Pick a path under `base_dir` that does not collide with an existing file
///
/// `file.txt` becomes `file (1).txt`, `file (2).txt` and so on.
pub async fn unique_path(base_dir: impl AsRef<Path>, filename: &str) -> PathBuf {
    let base_dir = base_dir.as_ref();
    let path = base_dir.join(filename);

    if !fs::try_exists(&path).await.unwrap_or(false) {
        return path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(dot) if dot > 0 => filename.split_at(dot),
        _ => (filename, ""),
    };

    let mut index = 1u32;
    loop {
        let candidate = base_dir.join(format!("{} ({}){}", stem, index, ext));
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        index += 1;
    }
}
