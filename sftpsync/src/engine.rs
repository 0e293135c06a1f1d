//! Sync engine that drives one mirroring pass
//!
//! A pass runs in four steps: make sure the destination root exists, walk
//! the source top-down copying every accepted file that is out of date,
//! optionally walk the destination bottom-up removing whatever the first
//! walk did not claim, then report statistics.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detector::is_up_to_date;
use crate::error::{Result, SyncError};
use crate::filter::FilterSet;
use crate::fs::{self, DirectoryFilesystem, EntryKind, FileMeta, StatResult};
use crate::paths::{parent, SyncRoots, SEPARATOR};
use crate::stats::TransferStats;
use crate::walker::{TreeWalker, WalkEntry, WalkOrder};

/// Which side of the session is the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local source, remote destination
    Upload,
    /// Remote source, local destination
    Download,
}

/// Options for a sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Regular expressions a relative path must match (empty matches all)
    #[serde(default)]
    pub includes: Vec<String>,
    /// Regular expressions a relative path must not match
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Remove destination entries not claimed by the source walk
    #[serde(default)]
    pub delete: bool,
    /// Report what would happen without touching the destination
    #[serde(default)]
    pub dry_run: bool,
}

/// Input to one sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub source: String,
    pub destination: String,
    pub direction: Direction,
    pub options: SyncOptions,
}

impl SyncRequest {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            direction,
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }
}

/// Destination paths claimed by the source walk, by kind
#[derive(Debug, Default)]
pub struct DestinationManifest {
    files: HashSet<String>,
    directories: HashSet<String>,
}

impl DestinationManifest {
    pub fn record(&mut self, kind: EntryKind, path: String) {
        match kind {
            EntryKind::File => self.files.insert(path),
            EntryKind::Directory => self.directories.insert(path),
        };
    }

    pub fn contains(&self, kind: EntryKind, path: &str) -> bool {
        match kind {
            EntryKind::File => self.files.contains(path),
            EntryKind::Directory => self.directories.contains(path),
        }
    }
}

/// Sync engine over a source and a destination filesystem
pub struct SyncEngine<'a> {
    source: &'a dyn DirectoryFilesystem,
    destination: &'a dyn DirectoryFilesystem,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        source: &'a dyn DirectoryFilesystem,
        destination: &'a dyn DirectoryFilesystem,
    ) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Run one pass
    pub async fn sync(&self, request: &SyncRequest) -> Result<TransferStats> {
        let options = &request.options;
        let filters = FilterSet::new(&options.includes, &options.excludes)?;
        let roots = SyncRoots::resolve(&request.source, &request.destination);

        debug!(
            "{:?} {} to {} (delete: {}, dry run: {})",
            request.direction,
            self.source.display_path(roots.source()),
            self.destination.display_path(roots.destination()),
            options.delete,
            options.dry_run
        );

        let started = Instant::now();
        let mut stats = TransferStats::new(options.dry_run);

        self.ensure_directory(roots.destination(), options.dry_run, &mut stats)
            .await?;

        let manifest = self
            .copy_pass(&roots, &filters, options.dry_run, &mut stats)
            .await?;

        if options.delete {
            self.delete_pass(roots.destination(), &manifest, options.dry_run, &mut stats)
                .await;
        }

        stats.finish(started);
        debug!("transferred {} bytes in {:?}", stats.total_bytes, stats.elapsed);
        Ok(stats)
    }

    /// Walk the source top-down, creating directories and copying stale files
    async fn copy_pass(
        &self,
        roots: &SyncRoots,
        filters: &FilterSet,
        dry_run: bool,
        stats: &mut TransferStats,
    ) -> Result<DestinationManifest> {
        let mut manifest = DestinationManifest::default();
        let mut implied_parents = HashSet::new();
        let mut walker = TreeWalker::new(self.source, roots.source(), WalkOrder::TopDown);

        while let Some(entry) = walker.next().await {
            let relative = roots.relative(&entry.path);
            if !filters.accepts(relative) {
                debug!("skip {}", self.source.display_path(&entry.path));
                stats.entries_filtered += 1;
                continue;
            }

            let dest_path = roots.destination_for(&entry.path);
            manifest.record(entry.kind, dest_path.clone());

            match entry.kind {
                EntryKind::Directory => {
                    self.ensure_directory(&dest_path, dry_run, stats).await?;
                }
                EntryKind::File => {
                    let meta = file_metadata(&entry)?;
                    if is_up_to_date(self.destination, &dest_path, &meta).await {
                        stats.files_up_to_date += 1;
                        continue;
                    }
                    self.ensure_parent(
                        roots,
                        &manifest,
                        &mut implied_parents,
                        &dest_path,
                        dry_run,
                        stats,
                    )
                    .await?;
                    if dry_run {
                        debug!(
                            "copy {} to {}",
                            self.source.display_path(&entry.path),
                            self.destination.display_path(&dest_path)
                        );
                    } else {
                        self.copy_file(&entry.path, &dest_path, &meta).await?;
                    }
                    stats.record_copy(meta.size);
                }
            }
        }

        Ok(manifest)
    }

    /// Walk the destination bottom-up removing unclaimed entries
    async fn delete_pass(
        &self,
        root: &str,
        manifest: &DestinationManifest,
        dry_run: bool,
        stats: &mut TransferStats,
    ) {
        let mut walker = TreeWalker::new(self.destination, root, WalkOrder::BottomUp);

        while let Some(entry) = walker.next().await {
            if manifest.contains(entry.kind, &entry.path) {
                continue;
            }

            debug!("remove {}", self.destination.display_path(&entry.path));
            if dry_run {
                stats.entries_deleted += 1;
                continue;
            }

            let result = match entry.kind {
                EntryKind::File => self.destination.remove_file(&entry.path).await,
                EntryKind::Directory => self.destination.remove_dir(&entry.path).await,
            };
            match result {
                Ok(()) => stats.entries_deleted += 1,
                Err(e) => {
                    warn!(
                        "failed to remove {}: {}",
                        self.destination.display_path(&entry.path),
                        e
                    );
                    stats.deletion_failures += 1;
                }
            }
        }
    }

    async fn ensure_directory(
        &self,
        path: &str,
        dry_run: bool,
        stats: &mut TransferStats,
    ) -> Result<()> {
        if let StatResult::Found(_) = self.destination.stat(path).await {
            return Ok(());
        }

        debug!(
            "create destination directory {}",
            self.destination.display_path(path)
        );
        if !dry_run {
            self.destination.create_dir_all(path).await?;
        }
        stats.directories_created += 1;
        Ok(())
    }

    /// Create the parent of a file whose own directory entry was filtered out.
    ///
    /// `implied` remembers parents already handled so a dry run counts each
    /// one once, as a real run would.
    async fn ensure_parent(
        &self,
        roots: &SyncRoots,
        manifest: &DestinationManifest,
        implied: &mut HashSet<String>,
        dest_path: &str,
        dry_run: bool,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let parent_dir = parent(dest_path);
        let root = roots.destination().trim_end_matches(SEPARATOR);
        if parent_dir == root
            || parent_dir == roots.destination()
            || parent_dir.is_empty()
            || manifest.contains(EntryKind::Directory, parent_dir)
            || implied.contains(parent_dir)
        {
            return Ok(());
        }
        implied.insert(parent_dir.to_string());
        if self.destination.stat(parent_dir).await.is_found() {
            return Ok(());
        }
        debug!(
            "create parent directory {}",
            self.destination.display_path(parent_dir)
        );
        if !dry_run {
            self.destination.create_dir_all(parent_dir).await?;
        }
        stats.directories_created += 1;
        Ok(())
    }

    /// Stream a file across and stamp the source times on the copy
    async fn copy_file(&self, source: &str, destination: &str, meta: &FileMeta) -> Result<()> {
        info!(
            "copy {} to {}",
            self.source.display_path(source),
            self.destination.display_path(destination)
        );

        fs::copy_file(self.source, source, self.destination, destination).await?;

        self.destination
            .set_times(destination, meta.accessed, meta.modified)
            .await
            .map_err(|e| SyncError::copy_error(source, destination, e.to_string()))
    }
}

fn file_metadata(entry: &WalkEntry) -> Result<FileMeta> {
    entry.metadata.ok_or_else(|| {
        SyncError::path_error(
            entry.path.as_str(),
            "walker produced a file entry without metadata",
        )
    })
}
