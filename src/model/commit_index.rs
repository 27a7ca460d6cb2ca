//! Commit index: `commits/<h2>/<h38>/applications/<app>/.gitkeep`, the
//! inverse map from a release's source commit to the application it
//! released. Populated only when the source commit id is a valid
//! lowercase 40-hex SHA-1.

use crate::errors::{EngineError, EngineResult};
use crate::fs::Filesystem;
use crate::hash::{is_valid_sha1, CommitHash};

fn index_entry_dir<F: Filesystem>(fs: &F, source_commit_id: &str, app: &str) -> String {
    let hash: CommitHash = source_commit_id
        .parse()
        .expect("caller must check is_valid_sha1 before calling commit_index functions");
    fs.join(&[
        "commits",
        &hash.shard(),
        &hash.rest(),
        "applications",
        app,
    ])
}

/// Record that `app` was released from `source_commit_id`, optionally
/// alongside the source commit's message. A no-op if the commit id is not
/// a syntactically valid SHA-1.
pub async fn record<F: Filesystem>(
    fs: &F,
    source_commit_id: &str,
    app: &str,
    source_message: Option<&str>,
) -> EngineResult<()> {
    if !is_valid_sha1(source_commit_id) {
        return Ok(());
    }
    let marker = fs.join(&[&index_entry_dir(fs, source_commit_id, app), ".gitkeep"]);
    fs.write(&marker, b"")
        .await
        .map_err(|e| EngineError::io(marker, e))?;
    if let Some(message) = source_message {
        let hash: CommitHash = source_commit_id
            .parse()
            .expect("is_valid_sha1 checked above");
        let path = fs.join(&["commits", &hash.shard(), &hash.rest(), "source_message"]);
        fs.write(&path, message.as_bytes())
            .await
            .map_err(|e| EngineError::io(path, e))?;
    }
    Ok(())
}

/// Remove the inverse index entry for `app` at `source_commit_id`, e.g. when
/// the release it was created for is cleaned up or its environment is
/// deleted. A no-op if the commit id is invalid or the entry is absent.
pub async fn remove<F: Filesystem>(fs: &F, source_commit_id: &str, app: &str) -> EngineResult<()> {
    if !is_valid_sha1(source_commit_id) {
        return Ok(());
    }
    let dir = index_entry_dir(fs, source_commit_id, app);
    if fs.stat(&dir).await.is_ok() {
        fs.remove(&dir).await.map_err(|e| EngineError::io(dir, e))?;
    }
    Ok(())
}

/// Every application released from `source_commit_id`, sorted. Empty for an
/// invalid or unknown commit id.
pub async fn applications_for_commit<F: Filesystem>(fs: &F, source_commit_id: &str) -> EngineResult<Vec<String>> {
    if !is_valid_sha1(source_commit_id) {
        return Ok(Vec::new());
    }
    let hash: CommitHash = source_commit_id
        .parse()
        .map_err(|e: String| EngineError::invalid_argument(e))?;
    let dir = fs.join(&["commits", &hash.shard(), &hash.rest(), "applications"]);
    crate::fs::list_names_or_empty(fs, &dir)
        .await
        .map_err(|e| EngineError::io(dir, e))
}
