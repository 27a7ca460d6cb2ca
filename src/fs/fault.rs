//! A fault-injecting [`Filesystem`] wrapper for testing error propagation:
//! a usage-collecting wrapper that substitutes an error for a specific
//! operation and path.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{DirEntry, Filesystem, NodeKind};

/// Which operation a fault should apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    Read,
    Write,
    Symlink,
    ReadLink,
    ReadDir,
    Stat,
    Remove,
}

/// Wraps an inner filesystem and lets tests substitute an `io::Error` for a
/// specific (operation, path) pair, while also recording every call for
/// assertions.
#[derive(Clone)]
pub struct FaultInjectingFilesystem<F: Filesystem> {
    inner: F,
    faults: Arc<Mutex<HashMap<(FsOp, String), io::ErrorKind>>>,
    calls: Arc<Mutex<Vec<(FsOp, String)>>>,
}

impl<F: Filesystem> FaultInjectingFilesystem<F> {
    pub fn new(inner: F) -> Self {
        FaultInjectingFilesystem {
            inner,
            faults: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make the next (and every subsequent) call to `op` at `path` fail.
    pub fn inject(&self, op: FsOp, path: impl Into<String>, kind: io::ErrorKind) {
        self.faults
            .lock()
            .expect("fault map poisoned")
            .insert((op, path.into()), kind);
    }

    pub fn calls(&self) -> Vec<(FsOp, String)> {
        self.calls.lock().expect("calls poisoned").clone()
    }

    fn record_and_check(&self, op: FsOp, path: &str) -> io::Result<()> {
        self.calls
            .lock()
            .expect("calls poisoned")
            .push((op, path.to_string()));
        if let Some(kind) = self
            .faults
            .lock()
            .expect("fault map poisoned")
            .get(&(op, path.to_string()))
        {
            return Err(io::Error::new(*kind, format!("injected fault on {path}")));
        }
        Ok(())
    }
}

#[async_trait]
impl<F: Filesystem> Filesystem for FaultInjectingFilesystem<F> {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.record_and_check(FsOp::Read, path)?;
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        self.record_and_check(FsOp::Write, path)?;
        self.inner.write(path, data).await
    }

    async fn symlink(&self, path: &str, target: &str) -> io::Result<()> {
        self.record_and_check(FsOp::Symlink, path)?;
        self.inner.symlink(path, target).await
    }

    async fn read_link(&self, path: &str) -> io::Result<String> {
        self.record_and_check(FsOp::ReadLink, path)?;
        self.inner.read_link(path).await
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        self.record_and_check(FsOp::ReadDir, path)?;
        self.inner.read_dir(path).await
    }

    async fn stat(&self, path: &str) -> io::Result<NodeKind> {
        self.record_and_check(FsOp::Stat, path)?;
        self.inner.stat(path).await
    }

    async fn remove(&self, path: &str) -> io::Result<()> {
        self.record_and_check(FsOp::Remove, path)?;
        self.inner.remove(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::MemoryFilesystem;

    #[tokio::test]
    async fn injected_fault_surfaces_on_matching_call() {
        let fs = FaultInjectingFilesystem::new(MemoryFilesystem::new());
        fs.write("a", b"1").await.unwrap();
        fs.inject(FsOp::Read, "a", io::ErrorKind::PermissionDenied);
        let err = fs.read("a").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn calls_are_recorded_in_order() {
        let fs = FaultInjectingFilesystem::new(MemoryFilesystem::new());
        fs.write("a", b"1").await.unwrap();
        let _ = fs.read("a").await;
        let calls = fs.calls();
        assert_eq!(calls, vec![(FsOp::Write, "a".to_string()), (FsOp::Read, "a".to_string())]);
    }
}
