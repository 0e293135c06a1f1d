//! Filesystem capability shared by the local and remote sides of a sync
//!
//! The sync engine only ever talks to a source and a destination through
//! [`DirectoryFilesystem`], so the same code drives uploads, downloads and
//! local-to-local runs.

pub mod local;
pub mod sftp;

#[cfg(test)]
pub(crate) mod memory;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SyncError};

pub use local::LocalFs;
pub use sftp::SftpFs;

/// Kind of a filesystem node as seen by the sync engine.
///
/// Anything that is not a directory (regular files, symlinks to files,
/// devices) is treated as a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata observed for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub kind: EntryKind,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
    /// Last access time
    pub accessed: SystemTime,
}

impl FileMeta {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// One child returned by [`DirectoryFilesystem::list`]
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub meta: FileMeta,
    /// The child is a symbolic link; `meta` may describe its target
    pub is_symlink: bool,
}

impl DirEntry {
    /// Whether a walk should recurse into this child.
    ///
    /// Links to directories are reported but never followed.
    pub fn is_traversable(&self) -> bool {
        self.meta.is_dir() && !self.is_symlink
    }
}

/// Outcome of a stat call; a missing or unreadable path is `NotFound`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatResult {
    Found(FileMeta),
    NotFound,
}

impl StatResult {
    pub fn is_found(&self) -> bool {
        matches!(self, StatResult::Found(_))
    }
}

/// Order in which the walker yields the children of one directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkLayout {
    /// All non-directories of a level, then all of its directories
    Grouped,
    /// Children in listing order, recursing into directories as they come
    Interleaved,
}

pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;
pub type FileWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Primitive operations the sync engine needs from either side
#[async_trait]
pub trait DirectoryFilesystem: Send + Sync {
    /// How the walker should order the children of a directory
    fn layout(&self) -> WalkLayout;

    /// Human readable location, used in log lines
    fn display_path(&self, path: &str) -> String {
        path.to_string()
    }

    /// Immediate children of a directory, excluding `.` and `..`
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Metadata for a path
    async fn stat(&self, path: &str) -> StatResult;

    /// Create a directory and any missing ancestors
    async fn create_dir_all(&self, path: &str) -> Result<()>;

    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Remove an empty directory
    async fn remove_dir(&self, path: &str) -> Result<()>;

    async fn open_read(&self, path: &str) -> Result<FileReader>;

    /// Create or truncate a file for writing
    async fn open_write(&self, path: &str) -> Result<FileWriter>;

    /// Set access and modification times, truncated to whole seconds
    async fn set_times(&self, path: &str, accessed: SystemTime, modified: SystemTime) -> Result<()>;
}

/// Stream one file from `source` to `destination`, returning the bytes copied.
///
/// Every failure, including opening either side, is a [`SyncError::FileCopy`].
pub async fn copy_file(
    source: &dyn DirectoryFilesystem,
    source_path: &str,
    destination: &dyn DirectoryFilesystem,
    destination_path: &str,
) -> Result<u64> {
    let copy_error = |message: String| {
        SyncError::copy_error(
            source.display_path(source_path),
            destination.display_path(destination_path),
            message,
        )
    };

    let mut reader = source
        .open_read(source_path)
        .await
        .map_err(|e| copy_error(e.to_string()))?;
    let mut writer = destination
        .open_write(destination_path)
        .await
        .map_err(|e| copy_error(e.to_string()))?;

    let bytes = tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|e| copy_error(e.to_string()))?;
    writer.shutdown().await.map_err(|e| copy_error(e.to_string()))?;
    Ok(bytes)
}

/// Whole seconds since the Unix epoch; times before the epoch map to 0
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
