//! One-way directory mirroring over SFTP
//!
//! This library provides:
//! - Translation between source and destination path namespaces
//! - Regular expression include/exclude filtering
//! - Lazy top-down and bottom-up tree walking over local and remote trees
//! - Size and modification-time change detection
//! - A copy pass followed by an optional deletion pass, with dry-run support

pub mod client;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod filter;
pub mod fs;
pub mod paths;
pub mod stats;
pub mod walker;

// Re-export main types and functions
pub use client::SftpSync;
pub use config::{ConnectionConfig, Profile};
pub use detector::{is_up_to_date, MTIME_TOLERANCE};
pub use engine::{DestinationManifest, Direction, SyncEngine, SyncOptions, SyncRequest};
pub use error::{Result, SyncError};
pub use filter::FilterSet;
pub use fs::{DirectoryFilesystem, EntryKind, FileMeta, LocalFs, SftpFs, StatResult};
pub use paths::SyncRoots;
pub use stats::TransferStats;
pub use walker::{TreeWalker, WalkEntry, WalkOrder};

/// Mirror two directories on the local filesystem
pub async fn sync_local(
    source: &str,
    destination: &str,
    options: SyncOptions,
) -> Result<TransferStats> {
    let request = SyncRequest::new(source, destination, Direction::Upload).with_options(options);
    SyncEngine::new(&LocalFs, &LocalFs).sync(&request).await
}
