//! An in-memory [`Filesystem`](super::Filesystem), the default backend for
//! tests and for the commit store's per-commit snapshots.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{DirEntry, Filesystem, NodeKind, Snapshotable};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Symlink(String),
    Dir(BTreeMap<String, Node>),
}

impl Node {
    fn kind(&self) -> NodeKind {
        match self {
            Node::File(_) => NodeKind::File,
            Node::Symlink(_) => NodeKind::Symlink,
            Node::Dir(_) => NodeKind::Dir,
        }
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such path: {path}"))
}

fn not_a_dir(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("not a directory: {path}"),
    )
}

fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// A clonable handle to a shared, mutable in-memory tree. Cloning a
/// [`MemoryFilesystem`] yields another handle to the *same* tree (cheap
/// `Arc` clone) — use [`MemoryFilesystem::snapshot`] to deep-copy the tree
/// when an independent working copy is required (e.g. checking out a commit).
#[derive(Debug, Clone)]
pub struct MemoryFilesystem {
    root: Arc<Mutex<Node>>,
}

impl Default for MemoryFilesystem {
    fn default() -> Self {
        MemoryFilesystem {
            root: Arc::new(Mutex::new(Node::Dir(BTreeMap::new()))),
        }
    }
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep-copy the current tree into a brand new, independently mutable
    /// filesystem. This is how the commit store checks out a commit's
    /// snapshot without aliasing the stored version.
    pub fn snapshot(&self) -> Self {
        let guard = self.root.lock().expect("memory fs lock poisoned");
        MemoryFilesystem {
            root: Arc::new(Mutex::new(guard.clone())),
        }
    }

    fn with_node<T>(&self, path: &str, f: impl FnOnce(&Node) -> io::Result<T>) -> io::Result<T> {
        let guard = self.root.lock().expect("memory fs lock poisoned");
        let node = Self::navigate(&guard, &components(path))?;
        f(node)
    }

    fn navigate<'a>(root: &'a Node, parts: &[&str]) -> io::Result<&'a Node> {
        let mut cur = root;
        for part in parts {
            match cur {
                Node::Dir(children) => {
                    cur = children.get(*part).ok_or_else(|| not_found(part))?;
                }
                _ => return Err(not_a_dir(part)),
            }
        }
        Ok(cur)
    }

    fn navigate_mut<'a>(root: &'a mut Node, parts: &[&str]) -> io::Result<&'a mut Node> {
        let mut cur = root;
        for part in parts {
            match cur {
                Node::Dir(children) => {
                    cur = children.get_mut(*part).ok_or_else(|| not_found(part))?;
                }
                _ => return Err(not_a_dir(part)),
            }
        }
        Ok(cur)
    }

    /// Walk to the parent directory of `parts`, creating intermediate
    /// directories as needed, and return a mutable reference to it.
    fn mkdir_parents<'a>(root: &'a mut Node, parts: &[&str]) -> io::Result<&'a mut BTreeMap<String, Node>> {
        let mut cur = root;
        for part in parts {
            match cur {
                Node::Dir(children) => {
                    cur = children
                        .entry((*part).to_string())
                        .or_insert_with(|| Node::Dir(BTreeMap::new()));
                }
                _ => return Err(not_a_dir(part)),
            }
        }
        match cur {
            Node::Dir(children) => Ok(children),
            _ => Err(not_a_dir(parts.last().copied().unwrap_or(""))),
        }
    }
}

#[async_trait]
impl Filesystem for MemoryFilesystem {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.with_node(path, |n| match n {
            Node::File(data) => Ok(data.clone()),
            _ => Err(not_found(path)),
        })
    }

    async fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let parts = components(path);
        let (dir_parts, name) = parts.split_at(parts.len().saturating_sub(1));
        let name = name.first().copied().ok_or_else(|| not_found(path))?;
        let mut guard = self.root.lock().expect("memory fs lock poisoned");
        let children = Self::mkdir_parents(&mut guard, dir_parts)?;
        children.insert(name.to_string(), Node::File(data.to_vec()));
        Ok(())
    }

    async fn symlink(&self, path: &str, target: &str) -> io::Result<()> {
        let parts = components(path);
        let (dir_parts, name) = parts.split_at(parts.len().saturating_sub(1));
        let name = name.first().copied().ok_or_else(|| not_found(path))?;
        let mut guard = self.root.lock().expect("memory fs lock poisoned");
        let children = Self::mkdir_parents(&mut guard, dir_parts)?;
        children.insert(name.to_string(), Node::Symlink(target.to_string()));
        Ok(())
    }

    async fn read_link(&self, path: &str) -> io::Result<String> {
        self.with_node(path, |n| match n {
            Node::Symlink(target) => Ok(target.clone()),
            _ => Err(not_found(path)),
        })
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        self.with_node(path, |n| match n {
            Node::Dir(children) => Ok(children
                .iter()
                .map(|(name, node)| DirEntry {
                    name: name.clone(),
                    kind: node.kind(),
                })
                .collect()),
            _ => Err(not_a_dir(path)),
        })
    }

    async fn stat(&self, path: &str) -> io::Result<NodeKind> {
        if path.is_empty() {
            return Ok(NodeKind::Dir);
        }
        self.with_node(path, |n| Ok(n.kind()))
    }

    async fn remove(&self, path: &str) -> io::Result<()> {
        let parts = components(path);
        if parts.is_empty() {
            return Err(not_found(path));
        }
        let (dir_parts, name) = parts.split_at(parts.len() - 1);
        let name = name[0];
        let mut guard = self.root.lock().expect("memory fs lock poisoned");
        let parent = Self::navigate_mut(&mut guard, dir_parts)?;
        match parent {
            Node::Dir(children) => {
                children.remove(name).ok_or_else(|| not_found(path))?;
                Ok(())
            }
            _ => Err(not_a_dir(path)),
        }
    }
}

impl Snapshotable for MemoryFilesystem {
    fn snapshot(&self) -> Self {
        MemoryFilesystem::snapshot(self)
    }

    fn restore(&self, other: &Self) {
        let snapshot = other.root.lock().expect("memory fs lock poisoned").clone();
        *self.root.lock().expect("memory fs lock poisoned") = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let fs = MemoryFilesystem::new();
        fs.write("a/b/c.txt", b"hello").await.unwrap();
        assert_eq!(fs.read("a/b/c.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn read_dir_lists_children() {
        let fs = MemoryFilesystem::new();
        fs.write("environments/prod/locks/l1/message", b"m")
            .await
            .unwrap();
        fs.write("environments/prod/locks/l2/message", b"m")
            .await
            .unwrap();
        let mut names: Vec<_> = fs
            .read_dir("environments/prod/locks")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["l1", "l2"]);
    }

    #[tokio::test]
    async fn symlink_and_read_link() {
        let fs = MemoryFilesystem::new();
        fs.symlink("environments/prod/applications/app1/version", "../../../../applications/app1/releases/1")
            .await
            .unwrap();
        assert_eq!(fs.stat("environments/prod/applications/app1/version").await.unwrap(), NodeKind::Symlink);
        assert_eq!(
            fs.read_link("environments/prod/applications/app1/version")
                .await
                .unwrap(),
            "../../../../applications/app1/releases/1"
        );
    }

    #[tokio::test]
    async fn remove_cleans_up_empty_parent_via_helper() {
        let fs = MemoryFilesystem::new();
        fs.write("environments/prod/locks/l1/message", b"m")
            .await
            .unwrap();
        super::super::remove_lock_and_prune_parent(
            &fs,
            "environments/prod/locks/l1",
            "environments/prod/locks",
        )
        .await
        .unwrap();
        assert!(fs.stat("environments/prod/locks").await.is_err());
    }

    #[tokio::test]
    async fn snapshot_is_independent() {
        let fs = MemoryFilesystem::new();
        fs.write("a", b"1").await.unwrap();
        let snap = fs.snapshot();
        fs.write("a", b"2").await.unwrap();
        assert_eq!(snap.read("a").await.unwrap(), b"1");
        assert_eq!(fs.read("a").await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn restore_rolls_a_live_handle_back_to_a_snapshot() {
        let fs = MemoryFilesystem::new();
        fs.write("a", b"1").await.unwrap();
        let snap = fs.snapshot();
        let alias = fs.clone();
        fs.write("a", b"2").await.unwrap();
        fs.write("b", b"new").await.unwrap();

        fs.restore(&snap);

        assert_eq!(fs.read("a").await.unwrap(), b"1");
        assert!(fs.read("b").await.is_err());
        assert_eq!(alias.read("a").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn not_found_is_reported_for_missing_file() {
        let fs = MemoryFilesystem::new();
        let err = fs.read("does/not/exist").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
