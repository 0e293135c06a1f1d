//! Lazy depth-first traversal over any [`DirectoryFilesystem`]
//!
//! Directories are listed only when the walker reaches them, so callers can
//! act on early entries before the rest of the tree has been read.

use futures::stream::{self, Stream};
use tracing::debug;

use crate::fs::{DirEntry, DirectoryFilesystem, EntryKind, FileMeta, WalkLayout};
use crate::paths::join;

/// Traversal order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// A directory is yielded before anything below it
    TopDown,
    /// A directory is yielded after everything below it
    BottomUp,
}

/// One node produced by the walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub kind: EntryKind,
    /// Absolute path of the node
    pub path: String,
    /// Metadata; `None` for directories in bottom-up order
    pub metadata: Option<FileMeta>,
}

enum Task {
    Visit(String),
    Yield(WalkEntry),
}

/// Pull-based walker; a fresh walker re-traverses the tree
pub struct TreeWalker<'a> {
    fs: &'a dyn DirectoryFilesystem,
    order: WalkOrder,
    stack: Vec<Task>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(fs: &'a dyn DirectoryFilesystem, root: &str, order: WalkOrder) -> Self {
        Self {
            fs,
            order,
            stack: vec![Task::Visit(root.to_string())],
        }
    }

    /// Next entry, or `None` once the tree is exhausted
    pub async fn next(&mut self) -> Option<WalkEntry> {
        while let Some(task) = self.stack.pop() {
            match task {
                Task::Yield(entry) => return Some(entry),
                Task::Visit(dir) => self.expand(&dir).await,
            }
        }
        None
    }

    /// Adapt the walker into a [`Stream`]
    pub fn into_stream(self) -> impl Stream<Item = WalkEntry> + 'a {
        stream::unfold(self, |mut walker| async move {
            walker.next().await.map(|entry| (entry, walker))
        })
    }

    async fn expand(&mut self, dir: &str) {
        let children = match self.fs.list(dir).await {
            Ok(children) => children,
            Err(e) => {
                // A directory removed or unreadable mid-walk contributes nothing
                debug!("cannot list {}: {}", self.fs.display_path(dir), e);
                Vec::new()
            }
        };

        let tasks = match self.fs.layout() {
            WalkLayout::Grouped => self.grouped(dir, children),
            WalkLayout::Interleaved => self.interleaved(dir, children),
        };
        self.stack.extend(tasks.into_iter().rev());
    }

    fn grouped(&self, dir: &str, children: Vec<DirEntry>) -> Vec<Task> {
        let (dirs, files): (Vec<DirEntry>, Vec<DirEntry>) =
            children.into_iter().partition(|child| child.meta.is_dir());

        let mut tasks = Vec::with_capacity(files.len() + dirs.len() * 2);
        let file_tasks = files
            .into_iter()
            .map(|child| Task::Yield(file_entry(dir, child)));

        let visits: Vec<Task> = dirs
            .iter()
            .filter(|d| d.is_traversable())
            .map(|d| Task::Visit(join(dir, &d.name)))
            .collect();

        match self.order {
            WalkOrder::TopDown => {
                tasks.extend(file_tasks);
                tasks.extend(
                    dirs.into_iter()
                        .map(|child| Task::Yield(dir_entry(dir, child, true))),
                );
                tasks.extend(visits);
            }
            WalkOrder::BottomUp => {
                tasks.extend(visits);
                tasks.extend(file_tasks);
                tasks.extend(
                    dirs.into_iter()
                        .map(|child| Task::Yield(dir_entry(dir, child, false))),
                );
            }
        }
        tasks
    }

    fn interleaved(&self, dir: &str, children: Vec<DirEntry>) -> Vec<Task> {
        let mut tasks = Vec::with_capacity(children.len());
        for child in children {
            if !child.meta.is_dir() {
                tasks.push(Task::Yield(file_entry(dir, child)));
                continue;
            }
            let visit = child
                .is_traversable()
                .then(|| Task::Visit(join(dir, &child.name)));
            match self.order {
                WalkOrder::TopDown => {
                    tasks.push(Task::Yield(dir_entry(dir, child, true)));
                    tasks.extend(visit);
                }
                WalkOrder::BottomUp => {
                    tasks.extend(visit);
                    tasks.push(Task::Yield(dir_entry(dir, child, false)));
                }
            }
        }
        tasks
    }
}

fn file_entry(dir: &str, child: DirEntry) -> WalkEntry {
    WalkEntry {
        kind: EntryKind::File,
        path: join(dir, &child.name),
        metadata: Some(child.meta),
    }
}

fn dir_entry(dir: &str, child: DirEntry, with_metadata: bool) -> WalkEntry {
    WalkEntry {
        kind: EntryKind::Directory,
        path: join(dir, &child.name),
        metadata: with_metadata.then_some(child.meta),
    }
}
