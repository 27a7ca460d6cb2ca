//! Commit store: an append-only object store keyed by commit hash, holding
//! a snapshot of the filesystem per commit and resolving refs (`HEAD`, the
//! branch name, commit prefixes).
//!
//! The commit hash is computed from the working-tree content only
//! (`environments/` and `applications/`); the `commits/` subtree that holds
//! per-commit metadata, the event log, and the commit index is written
//! after the hash is known and never contributes to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::errors::{EngineError, EngineResult};
use crate::fs::{Filesystem, NodeKind, Snapshotable};
use crate::hash::{is_valid_sha1_prefix, CommitHash, SHA1_HEX_LEN};
use crate::model::event::{self, Event};

/// The top-level directories that are content-addressed into the commit
/// hash. `commits/` itself is deliberately excluded.
const HASHED_ROOTS: &[&str] = &["environments", "applications"];

#[derive(Debug, Clone)]
pub struct CommitMetadata {
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committed_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub hash: CommitHash,
    pub touched_applications: Vec<String>,
    pub events: Vec<Event>,
}

/// A single append-only store. `F` is shared between the live working tree
/// and the `commits/` metadata area; checked-out historical snapshots are
/// independent deep copies produced via [`Snapshotable`].
pub struct CommitStore<F: Filesystem + Snapshotable> {
    fs: F,
    branch: String,
    refs: Arc<Mutex<HashMap<String, CommitHash>>>,
    history: Arc<Mutex<HashMap<CommitHash, F>>>,
}

impl<F: Filesystem + Snapshotable> CommitStore<F> {
    pub fn new(fs: F, branch: impl Into<String>) -> Self {
        CommitStore {
            fs,
            branch: branch.into(),
            refs: Arc::new(Mutex::new(HashMap::new())),
            history: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The live filesystem the active batch mutates directly.
    pub fn working_tree(&self) -> &F {
        &self.fs
    }

    /// The commit hash the branch currently points at, or `None` before the
    /// first commit.
    pub fn head(&self) -> Option<CommitHash> {
        self.refs.lock().expect("refs lock poisoned").get(&self.branch).copied()
    }

    /// Compute the hash of the current working tree, write `commits/<h2>/<h38>`
    /// metadata, advance the branch ref, and retain a deep snapshot for
    /// later checkout.
    pub async fn commit(&self, metadata: CommitMetadata) -> EngineResult<CommitHash> {
        let hash = hash_tree(&self.fs).await?;
        let dir = format!("commits/{}/{}", hash.shard(), hash.rest());

        let message_path = self.fs.join(&[&dir, "commit_message"]);
        self.fs
            .write(&message_path, metadata.message.as_bytes())
            .await
            .map_err(|e| EngineError::io(message_path, e))?;
        let author_name_path = self.fs.join(&[&dir, "commit_author_name"]);
        self.fs
            .write(&author_name_path, metadata.author_name.as_bytes())
            .await
            .map_err(|e| EngineError::io(author_name_path, e))?;
        let author_email_path = self.fs.join(&[&dir, "commit_author_email"]);
        self.fs
            .write(&author_email_path, metadata.author_email.as_bytes())
            .await
            .map_err(|e| EngineError::io(author_email_path, e))?;
        let time_path = self.fs.join(&[&dir, "commit_author_time_utc"]);
        self.fs
            .write(&time_path, metadata.committed_at_utc.to_rfc3339().as_bytes())
            .await
            .map_err(|e| EngineError::io(time_path, e))?;

        self.refs
            .lock()
            .expect("refs lock poisoned")
            .insert(self.branch.clone(), hash);
        self.history
            .lock()
            .expect("history lock poisoned")
            .insert(hash, self.fs.snapshot());

        tracing::info!(commit = %hash, branch = %self.branch, "committed batch");
        Ok(hash)
    }

    /// Resolve `"HEAD"`, the configured branch name, or a full 40-hex commit
    /// id. Any other string is rejected. Unknown commit ids are accepted
    /// and returned as-is (mirroring the RepoServer-compatible read API).
    pub fn resolve_revision(&self, revision: &str) -> EngineResult<CommitHash> {
        if revision == "HEAD" || revision == self.branch {
            return self.head().ok_or_else(|| {
                EngineError::not_found(format!(
                    "unknown revision \"{revision}\", I only know \"HEAD\", \"{}\" and commit hashes",
                    self.branch
                ))
            });
        }
        if revision.len() == SHA1_HEX_LEN {
            if let Ok(hash) = revision.parse::<CommitHash>() {
                return Ok(hash);
            }
        }
        Err(EngineError::not_found(format!(
            "unknown revision \"{revision}\", I only know \"HEAD\", \"{}\" and commit hashes",
            self.branch
        )))
    }

    /// Check out an independent, deep-copied snapshot of a previously
    /// committed tree.
    pub fn checkout(&self, hash: &CommitHash) -> EngineResult<F> {
        self.history
            .lock()
            .expect("history lock poisoned")
            .get(hash)
            .map(Snapshotable::snapshot)
            .ok_or_else(|| EngineError::not_found(format!("unknown commit \"{hash}\"")))
    }

    /// Resolve a commit-hash prefix of length [7, 40] to full commit info:
    /// the matched hash, the applications touched by it, and its events.
    pub async fn commit_info(&self, prefix: &str) -> EngineResult<CommitInfo> {
        if !is_valid_sha1_prefix(prefix) {
            return Err(EngineError::invalid_argument(format!(
                "commit prefix must be between 7 and {SHA1_HEX_LEN} lowercase hex characters"
            )));
        }
        let hash = if prefix.len() == SHA1_HEX_LEN {
            prefix
                .parse::<CommitHash>()
                .map_err(EngineError::invalid_argument)?
        } else {
            self.find_unique_prefix_match(prefix).await?
        };
        let touched_applications =
            crate::model::commit_index::applications_for_commit(&self.fs, &hash.to_string()).await?;
        let events = event::list_events(&self.fs, &hash).await?;
        Ok(CommitInfo {
            hash,
            touched_applications,
            events,
        })
    }

    async fn find_unique_prefix_match(&self, prefix: &str) -> EngineResult<CommitHash> {
        let shard = &prefix[..2];
        let rest_prefix = &prefix[2..];
        let shard_dir = self.fs.join(&["commits", shard]);
        let candidates = crate::fs::list_names_or_empty(&self.fs, &shard_dir)
            .await
            .map_err(|e| EngineError::io(shard_dir, e))?;
        let matches: Vec<String> = candidates
            .into_iter()
            .filter(|rest| rest.starts_with(rest_prefix))
            .collect();
        match matches.as_slice() {
            [single] => format!("{shard}{single}")
                .parse()
                .map_err(EngineError::invalid_argument),
            [] => Err(EngineError::not_found(format!("no commit matches prefix \"{prefix}\""))),
            _ => Err(EngineError::invalid_argument("commit_hash is not unique")),
        }
    }
}

/// Canonically encode the working-tree content under [`HASHED_ROOTS`] and
/// hash it. Encoding is a sorted list of `(path, kind, payload)` tuples so
/// two trees with identical content always hash identically regardless of
/// write order.
async fn hash_tree<F: Filesystem>(fs: &F) -> EngineResult<CommitHash> {
    let mut entries = Vec::new();
    for root in HASHED_ROOTS {
        walk(fs, root, &mut entries).await?;
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();
    for (path, kind, payload) in entries {
        buf.extend_from_slice(path.as_bytes());
        buf.push(0);
        buf.push(match kind {
            NodeKind::File => b'f',
            NodeKind::Dir => b'd',
            NodeKind::Symlink => b'l',
        });
        buf.push(0);
        buf.extend_from_slice(&payload);
        buf.push(0);
    }
    Ok(CommitHash::of(&buf))
}

fn walk<'a, F: Filesystem>(
    fs: &'a F,
    path: &'a str,
    out: &'a mut Vec<(String, NodeKind, Vec<u8>)>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = EngineResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let kind = match fs.stat(path).await {
            Ok(kind) => kind,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(EngineError::io(path.to_string(), e)),
        };
        match kind {
            NodeKind::File => {
                let content = fs.read(path).await.map_err(|e| EngineError::io(path.to_string(), e))?;
                out.push((path.to_string(), NodeKind::File, content));
            }
            NodeKind::Symlink => {
                let target = fs
                    .read_link(path)
                    .await
                    .map_err(|e| EngineError::io(path.to_string(), e))?;
                out.push((path.to_string(), NodeKind::Symlink, target.into_bytes()));
            }
            NodeKind::Dir => {
                let children = fs.read_dir(path).await.map_err(|e| EngineError::io(path.to_string(), e))?;
                for child in children {
                    let child_path = fs.join(&[path, &child.name]);
                    walk(fs, &child_path, out).await?;
                }
            }
        }
        Ok(())
    })
}
