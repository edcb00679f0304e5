//! Publishing the converted document to disk.
//!
//! Writes go to a temporary sibling file which is synced and then renamed
//! over the destination, so readers only ever see the old file or the
//! complete new one.

use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to create temporary file '{}': {source}", .path.display())]
    CreateTemp {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rename '{}' to '{}': {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What [`publish`] did with the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The destination now holds the new bytes.
    Written,
    /// The destination already held identical bytes; nothing was touched.
    Unchanged,
}

/// Atomically replaces `path` with `content`.
///
/// The temporary file is created with `create_new` next to `path` (same
/// filesystem, so the rename is atomic on POSIX), synced, closed, then
/// renamed. On any failure the temporary file is removed and `path` is left
/// as it was.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), WriteError> {
    use std::time::{SystemTime, UNIX_EPOCH};

    // SEC-009: Randomized temp filename to prevent TOCTOU race conditions
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(|source| WriteError::CreateTemp {
            path: temp_path.clone(),
            source,
        })?;

    let written = file.write_all(content).and_then(|_| file.sync_all());
    drop(file);
    if let Err(source) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(WriteError::Write {
            path: temp_path,
            source,
        });
    }

    // On Windows, rename fails if destination exists
    #[cfg(windows)]
    if path.exists() {
        if let Err(source) = std::fs::remove_file(path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(WriteError::Write {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    if let Err(source) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(WriteError::Rename {
            from: temp_path,
            to: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

/// Writes `content` to `path` unless the file already holds exactly it.
///
/// Skipping identical content keeps the file's mtime stable for the
/// scheduler's change detection.
pub fn publish(path: &Path, content: &[u8]) -> Result<PublishOutcome, WriteError> {
    if read_existing(path).as_deref() == Some(content) {
        tracing::info!(path = %path.display(), "Output unchanged, skipping write");
        return Ok(PublishOutcome::Unchanged);
    }

    write_atomic(path, content)?;
    tracing::info!(path = %path.display(), bytes = content.len(), "Wrote feed");
    Ok(PublishOutcome::Written)
}

/// Current content of a previously published file, if it can be read.
pub fn read_existing(path: &Path) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read existing output");
            None
        }
    }
}
