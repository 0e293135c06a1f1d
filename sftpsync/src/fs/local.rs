//! Local filesystem side of a sync

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::fs;

use crate::error::{Result, SyncError};
use crate::fs::{
    unix_seconds, DirEntry, DirectoryFilesystem, EntryKind, FileMeta, FileReader, FileWriter,
    StatResult, WalkLayout,
};

/// Local filesystem backend
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl From<&std::fs::Metadata> for FileMeta {
    fn from(metadata: &std::fs::Metadata) -> Self {
        Self {
            kind: if metadata.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            accessed: metadata.accessed().unwrap_or(UNIX_EPOCH),
        }
    }
}

#[async_trait]
impl DirectoryFilesystem for LocalFs {
    fn layout(&self) -> WalkLayout {
        WalkLayout::Grouped
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let mut read_dir = fs::read_dir(path).await.map_err(|e| {
            SyncError::path_error(path, format!("Failed to read directory: {}", e))
        })?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let is_symlink = entry.file_type().await?.is_symlink();
            // A link reports its target's metadata; a dangling link reports itself
            let metadata = if is_symlink {
                match fs::metadata(entry.path()).await {
                    Ok(metadata) => metadata,
                    Err(_) => entry.metadata().await?,
                }
            } else {
                entry.metadata().await?
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                meta: FileMeta::from(&metadata),
                is_symlink,
            });
        }

        Ok(entries)
    }

    async fn stat(&self, path: &str) -> StatResult {
        match fs::metadata(path).await {
            Ok(metadata) => StatResult::Found(FileMeta::from(&metadata)),
            Err(_) => StatResult::NotFound,
        }
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        fs::create_dir_all(path).await.map_err(|e| {
            SyncError::path_error(path, format!("Failed to create directory: {}", e))
        })
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| SyncError::deletion_error(path, format!("Failed to delete file: {}", e)))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        let is_symlink = fs::symlink_metadata(path)
            .await
            .map(|metadata| metadata.file_type().is_symlink())
            .unwrap_or(false);
        // Only the link goes; whatever it points at is left alone
        if is_symlink {
            return fs::remove_file(path).await.map_err(|e| {
                SyncError::deletion_error(path, format!("Failed to delete link: {}", e))
            });
        }

        fs::remove_dir(path).await.map_err(|e| {
            SyncError::deletion_error(path, format!("Failed to delete directory: {}", e))
        })
    }

    async fn open_read(&self, path: &str) -> Result<FileReader> {
        let file = fs::File::open(path)
            .await
            .map_err(|e| SyncError::path_error(path, format!("Failed to open file: {}", e)))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &str) -> Result<FileWriter> {
        let file = fs::File::create(path)
            .await
            .map_err(|e| SyncError::path_error(path, format!("Failed to create file: {}", e)))?;
        Ok(Box::new(file))
    }

    async fn set_times(
        &self,
        path: &str,
        accessed: SystemTime,
        modified: SystemTime,
    ) -> Result<()> {
        utime::set_file_times(
            Path::new(path),
            unix_seconds(accessed) as i64,
            unix_seconds(modified) as i64,
        )
        .map_err(|e| SyncError::path_error(path, format!("Failed to set file times: {}", e)))
    }
}
