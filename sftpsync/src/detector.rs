//! Change detection by size and modification time

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::fs::{DirectoryFilesystem, FileMeta, StatResult};

/// Largest modification-time difference still treated as "same"
pub const MTIME_TOLERANCE: Duration = Duration::from_secs(3);

/// Whether the destination already matches the source file.
///
/// A destination that cannot be stat'ed is never up to date.
pub async fn is_up_to_date(
    fs: &dyn DirectoryFilesystem,
    destination: &str,
    source: &FileMeta,
) -> bool {
    match fs.stat(destination).await {
        StatResult::Found(dest) => matches(destination, source, &dest),
        StatResult::NotFound => false,
    }
}

/// Compare already-fetched metadata
pub fn matches(destination: &str, source: &FileMeta, dest: &FileMeta) -> bool {
    if time_difference(source.modified, dest.modified) > MTIME_TOLERANCE {
        debug!(
            "{} modification time mismatch (source: {}, destination: {})",
            destination,
            DateTime::<Utc>::from(source.modified),
            DateTime::<Utc>::from(dest.modified)
        );
        return false;
    }
    dest.size == source.size
}

fn time_difference(a: SystemTime, b: SystemTime) -> Duration {
    match a.duration_since(b) {
        Ok(d) => d,
        Err(e) => e.duration(),
    }
}
