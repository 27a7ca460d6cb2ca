//! Filesystem abstraction the engine mutates: a minimal capability set of
//! open, create, read, write, readdir, stat, readlink, symlink, remove,
//! join, and root.
//!
//! A path is always a slash-separated, root-relative string (`"environments/acceptance/locks"`,
//! never `"/environments/..."`). [`join`] is the only sanctioned way to build one from parts.

pub mod fault;
pub mod memory;

use async_trait::async_trait;

/// What [`Filesystem::stat`] found at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
    Symlink,
}

/// One entry returned by [`Filesystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// The minimal capability set the transformer core needs from a
/// content-addressable working tree. Implementations must be `Clone` so the
/// commit store can check out an independent snapshot owned exclusively by
/// the active batch.
#[async_trait]
pub trait Filesystem: Send + Sync + Clone {
    /// Read a file's full contents. `NotFound` if absent or not a file.
    async fn read(&self, path: &str) -> std::io::Result<Vec<u8>>;

    /// Write (create or overwrite) a file, creating parent directories as needed.
    async fn write(&self, path: &str, data: &[u8]) -> std::io::Result<()>;

    /// Create a symlink at `path` pointing at `target` (a root-relative path).
    async fn symlink(&self, path: &str, target: &str) -> std::io::Result<()>;

    /// Read the target of a symlink. `NotFound` if absent or not a symlink.
    async fn read_link(&self, path: &str) -> std::io::Result<String>;

    /// List the direct children of a directory. `NotFound` if absent or not a directory.
    async fn read_dir(&self, path: &str) -> std::io::Result<Vec<DirEntry>>;

    /// Look up what kind of node exists at `path`, following no symlinks
    /// (the caller decides whether to `read_link` first).
    async fn stat(&self, path: &str) -> std::io::Result<NodeKind>;

    /// Remove a file, empty-or-not directory (recursively), or symlink.
    /// A no-op is NOT performed for missing paths: callers that want
    /// idempotent removal must `stat` first.
    async fn remove(&self, path: &str) -> std::io::Result<()>;

    /// Join root-relative path segments with `/`, collapsing empty segments.
    fn join(&self, parts: &[&str]) -> String {
        parts
            .iter()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The logical root of this filesystem, always `""` (root-relative paths
    /// never carry a leading slash).
    fn root(&self) -> &str {
        ""
    }
}

/// A [`Filesystem`] that can produce an independently mutable deep copy of
/// itself. The commit store uses this to check out a commit's tree without
/// aliasing the version it has on record.
pub trait Snapshotable: Filesystem {
    fn snapshot(&self) -> Self;

    /// Overwrite this filesystem's content in place with `other`'s,
    /// without changing which handle callers already hold onto. Used to
    /// roll a live working tree back to a pre-batch snapshot after a
    /// transformer fails partway through a batch.
    fn restore(&self, other: &Self);
}

/// Convenience: true iff `path` exists (any kind).
pub async fn exists<F: Filesystem>(fs: &F, path: &str) -> bool {
    fs.stat(path).await.is_ok()
}

/// Convenience: true iff `path` exists and is a directory.
pub async fn is_dir<F: Filesystem>(fs: &F, path: &str) -> bool {
    matches!(fs.stat(path).await, Ok(NodeKind::Dir))
}

/// Read a directory's entry names only, sorted. `NotFound` becomes an empty
/// vector, matching the many call sites in the transformer core that treat
/// "directory never existed" the same as "directory is empty".
pub async fn list_names_or_empty<F: Filesystem>(fs: &F, path: &str) -> std::io::Result<Vec<String>> {
    match fs.read_dir(path).await {
        Ok(mut entries) => {
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries.into_iter().map(|e| e.name).collect())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Remove the lock directory at `lock_dir`, then remove its parent `locks`
/// directory if it is now empty. Tolerant of the lock directory already
/// being gone.
pub async fn remove_lock_and_prune_parent<F: Filesystem>(
    fs: &F,
    lock_dir: &str,
    locks_parent: &str,
) -> std::io::Result<()> {
    if fs.stat(lock_dir).await.is_ok() {
        fs.remove(lock_dir).await?;
    }
    let remaining = list_names_or_empty(fs, locks_parent).await?;
    if remaining.is_empty() && fs.stat(locks_parent).await.is_ok() {
        fs.remove(locks_parent).await?;
    }
    Ok(())
}
