//! Statistics accumulated over one sync pass

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Transfer statistics for a single `sync` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Bytes copied (or that would be copied in a dry run)
    pub total_bytes: u64,
    /// Wall-clock duration of the pass
    pub elapsed: Duration,
    /// Files copied
    pub files_copied: usize,
    /// Files already up to date
    pub files_up_to_date: usize,
    /// Source entries rejected by the filters
    pub entries_filtered: usize,
    /// Destination directories created
    pub directories_created: usize,
    /// Extraneous destination entries removed
    pub entries_deleted: usize,
    /// Extraneous destination entries that could not be removed
    pub deletion_failures: usize,
    /// Whether nothing was actually written
    pub dry_run: bool,
}

impl TransferStats {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Record a copied file
    pub fn record_copy(&mut self, size: u64) {
        self.files_copied += 1;
        self.total_bytes += size;
    }

    /// Stamp the elapsed time from the start of the pass
    pub fn finish(&mut self, started: Instant) {
        self.elapsed = started.elapsed();
    }

    /// Average throughput in bytes per second
    pub fn transfer_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_bytes as f64 / secs
        } else {
            0.0
        }
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "{}transferred {} bytes in {:.2?} ({} copied, {} up to date, {} filtered, {} dirs created, {} deleted, {} delete failures)",
            if self.dry_run { "[dry run] " } else { "" },
            self.total_bytes,
            self.elapsed,
            self.files_copied,
            self.files_up_to_date,
            self.entries_filtered,
            self.directories_created,
            self.entries_deleted,
            self.deletion_failures,
        )
    }
}
