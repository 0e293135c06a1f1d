//! In-memory filesystem with remote-style behaviour, used by tests

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::{Result, SyncError};
use crate::fs::{
    unix_seconds, DirEntry, DirectoryFilesystem, EntryKind, FileMeta, FileReader, FileWriter,
    StatResult, WalkLayout,
};
use crate::paths::{ancestors, parent};

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Vec<u8>,
        modified: SystemTime,
        accessed: SystemTime,
    },
    Dir,
}

impl Node {
    fn meta(&self) -> FileMeta {
        match self {
            Node::File {
                data,
                modified,
                accessed,
            } => FileMeta {
                kind: EntryKind::File,
                size: data.len() as u64,
                modified: *modified,
                accessed: *accessed,
            },
            Node::Dir => FileMeta {
                kind: EntryKind::Directory,
                size: 0,
                modified: UNIX_EPOCH,
                accessed: UNIX_EPOCH,
            },
        }
    }
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    mutations: Vec<String>,
    failing_removals: BTreeSet<String>,
}

/// Thread-safe in-memory tree keyed by normalised absolute path
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryFs {
    state: Arc<Mutex<State>>,
}

fn normalize(path: &str) -> String {
    if path.len() > 1 {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}

pub(crate) fn secs(seconds: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(seconds)
}

impl MemoryFs {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.state
            .lock()
            .unwrap()
            .nodes
            .insert("/".to_string(), Node::Dir);
        fs
    }

    pub fn add_dir(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        for dir in ancestors(path) {
            state.nodes.entry(dir).or_insert(Node::Dir);
        }
    }

    pub fn add_file(&self, path: &str, data: &[u8], modified: u64) {
        self.add_dir(parent(path));
        self.state.lock().unwrap().nodes.insert(
            normalize(path),
            Node::File {
                data: data.to_vec(),
                modified: secs(modified),
                accessed: secs(modified),
            },
        );
    }

    /// Drop a subtree without recording a mutation
    pub fn remove_tree(&self, path: &str) {
        let path = normalize(path);
        let prefix = format!("{}/", path);
        self.state
            .lock()
            .unwrap()
            .nodes
            .retain(|key, _| key != &path && !key.starts_with(&prefix));
    }

    pub fn fail_removal_of(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_removals
            .insert(normalize(path));
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.state.lock().unwrap().nodes.get(&normalize(path)) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn modified(&self, path: &str) -> Option<SystemTime> {
        match self.state.lock().unwrap().nodes.get(&normalize(path)) {
            Some(Node::File { modified, .. }) => Some(*modified),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .nodes
            .contains_key(&normalize(path))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(
            self.state.lock().unwrap().nodes.get(&normalize(path)),
            Some(Node::Dir)
        )
    }

    /// Every mutating call made so far, in order
    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }
}

#[async_trait]
impl DirectoryFilesystem for MemoryFs {
    fn layout(&self) -> WalkLayout {
        WalkLayout::Interleaved
    }

    fn display_path(&self, path: &str) -> String {
        format!("memory:{}", path)
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = normalize(path);
        let state = self.state.lock().unwrap();
        if !matches!(state.nodes.get(&path), Some(Node::Dir)) {
            return Err(SyncError::remote_error(path, "no such directory"));
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(key, _)| key.as_str() != "/" && parent(key) == path)
            .map(|(key, node)| DirEntry {
                name: key.rsplit('/').next().unwrap_or(key).to_string(),
                meta: node.meta(),
                is_symlink: false,
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> StatResult {
        match self.state.lock().unwrap().nodes.get(&normalize(path)) {
            Some(node) => StatResult::Found(node.meta()),
            None => StatResult::NotFound,
        }
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for dir in ancestors(path) {
            match state.nodes.get(&dir) {
                Some(Node::Dir) => {}
                Some(Node::File { .. }) => {
                    return Err(SyncError::path_error(dir, "path component is a file"));
                }
                None => {
                    state.mutations.push(format!("mkdir {}", dir));
                    state.nodes.insert(dir, Node::Dir);
                }
            }
        }
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut state = self.state.lock().unwrap();
        if state.failing_removals.contains(&path) {
            return Err(SyncError::deletion_error(path, "permission denied"));
        }
        match state.nodes.get(&path) {
            Some(Node::File { .. }) => {
                state.nodes.remove(&path);
                state.mutations.push(format!("remove {}", path));
                Ok(())
            }
            _ => Err(SyncError::deletion_error(path, "not a file")),
        }
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut state = self.state.lock().unwrap();
        if state.failing_removals.contains(&path) {
            return Err(SyncError::deletion_error(path, "permission denied"));
        }
        let prefix = format!("{}/", path);
        if state.nodes.keys().any(|key| key.starts_with(&prefix)) {
            return Err(SyncError::deletion_error(path, "directory not empty"));
        }
        match state.nodes.get(&path) {
            Some(Node::Dir) => {
                state.nodes.remove(&path);
                state.mutations.push(format!("rmdir {}", path));
                Ok(())
            }
            _ => Err(SyncError::deletion_error(path, "not a directory")),
        }
    }

    async fn open_read(&self, path: &str) -> Result<FileReader> {
        match self.read(path) {
            Some(data) => Ok(Box::new(Cursor::new(data))),
            None => Err(SyncError::remote_error(path, "no such file")),
        }
    }

    async fn open_write(&self, path: &str) -> Result<FileWriter> {
        let path = normalize(path);
        let mut state = self.state.lock().unwrap();
        if !matches!(state.nodes.get(parent(&path)), Some(Node::Dir)) {
            return Err(SyncError::remote_error(path, "parent directory does not exist"));
        }
        state.mutations.push(format!("write {}", path));
        state.nodes.insert(
            path.clone(),
            Node::File {
                data: Vec::new(),
                modified: SystemTime::now(),
                accessed: SystemTime::now(),
            },
        );
        Ok(Box::new(MemoryWriter {
            path,
            state: Arc::clone(&self.state),
        }))
    }

    async fn set_times(
        &self,
        path: &str,
        accessed: SystemTime,
        modified: SystemTime,
    ) -> Result<()> {
        let path = normalize(path);
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("utime {}", path));
        match state.nodes.get_mut(&path) {
            Some(Node::File {
                modified: m,
                accessed: a,
                ..
            }) => {
                *m = secs(unix_seconds(modified));
                *a = secs(unix_seconds(accessed));
                Ok(())
            }
            _ => Err(SyncError::remote_error(path, "no such file")),
        }
    }
}

struct MemoryWriter {
    path: String,
    state: Arc<Mutex<State>>,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let mut state = self.state.lock().unwrap();
        match state.nodes.get_mut(&self.path) {
            Some(Node::File { data, .. }) => {
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "file vanished while writing",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
