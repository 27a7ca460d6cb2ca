//! Applications and releases: `applications/<app>/releases/<version>/...`.

use std::collections::BTreeMap;

use crate::errors::{EngineError, EngineResult};
use crate::fs::Filesystem;

/// A single version of an application, with one manifest per targeted
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Release {
    pub version: u64,
    pub source_commit_id: Option<String>,
    pub source_author: Option<String>,
    pub source_message: Option<String>,
    pub display_version: Option<String>,
    pub manifests: BTreeMap<String, String>,
}

/// A release whose every manifest is a single space character, used to mark
/// an application as intentionally undeployed from an environment.
pub fn is_undeploy_marker(release: &Release) -> bool {
    !release.manifests.is_empty() && release.manifests.values().all(|m| m == " ")
}

fn release_dir<F: Filesystem>(fs: &F, app: &str, version: u64) -> String {
    fs.join(&["applications", app, "releases", &version.to_string()])
}

pub async fn application_exists<F: Filesystem>(fs: &F, app: &str) -> bool {
    fs.stat(&fs.join(&["applications", app])).await.is_ok()
}

pub async fn read_team<F: Filesystem>(fs: &F, app: &str) -> EngineResult<Option<String>> {
    let path = fs.join(&["applications", app, "team"]);
    match fs.read(&path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EngineError::io(path, e)),
    }
}

pub async fn write_team<F: Filesystem>(fs: &F, app: &str, team: &str) -> EngineResult<()> {
    let path = fs.join(&["applications", app, "team"]);
    fs.write(&path, team.as_bytes())
        .await
        .map_err(|e| EngineError::io(path, e))
}

/// List every release version of `app`, sorted ascending. Empty if the app
/// has never had a release.
pub async fn list_release_versions<F: Filesystem>(fs: &F, app: &str) -> EngineResult<Vec<u64>> {
    let dir = fs.join(&["applications", app, "releases"]);
    let names = crate::fs::list_names_or_empty(fs, &dir)
        .await
        .map_err(|e| EngineError::io(dir, e))?;
    let mut versions: Vec<u64> = names.iter().filter_map(|n| n.parse().ok()).collect();
    versions.sort_unstable();
    Ok(versions)
}

pub async fn latest_release_version<F: Filesystem>(fs: &F, app: &str) -> EngineResult<Option<u64>> {
    Ok(list_release_versions(fs, app).await?.last().copied())
}

pub async fn read_release<F: Filesystem>(fs: &F, app: &str, version: u64) -> EngineResult<Release> {
    let dir = release_dir(fs, app, version);
    if fs.stat(&dir).await.is_err() {
        return Err(EngineError::not_found(format!(
            "release {version} of application \"{app}\" does not exist"
        )));
    }
    let read_opt = |name: &'static str| {
        let path = fs.join(&[&dir, name]);
        async move {
            match fs.read(&path).await {
                Ok(bytes) => Ok::<_, EngineError>(Some(String::from_utf8_lossy(&bytes).to_string())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(EngineError::io(path, e)),
            }
        }
    };
    let source_commit_id = read_opt("source_commit_id").await?;
    let source_author = read_opt("source_author").await?;
    let source_message = read_opt("source_message").await?;
    let display_version = read_opt("display_version").await?;

    let envs_dir = fs.join(&[&dir, "environments"]);
    let env_names = crate::fs::list_names_or_empty(fs, &envs_dir)
        .await
        .map_err(|e| EngineError::io(envs_dir.clone(), e))?;
    let mut manifests = BTreeMap::new();
    for env in env_names {
        let manifest_path = fs.join(&[&envs_dir, &env, "manifests.yaml"]);
        let bytes = fs
            .read(&manifest_path)
            .await
            .map_err(|e| EngineError::io(manifest_path, e))?;
        manifests.insert(env, String::from_utf8_lossy(&bytes).to_string());
    }

    Ok(Release {
        version,
        source_commit_id,
        source_author,
        source_message,
        display_version,
        manifests,
    })
}

pub async fn write_release<F: Filesystem>(fs: &F, app: &str, release: &Release) -> EngineResult<()> {
    let dir = release_dir(fs, app, release.version);
    let write_opt = |name: &'static str, value: &Option<String>| {
        let path = fs.join(&[&dir, name]);
        let value = value.clone();
        async move {
            if let Some(v) = value {
                fs.write(&path, v.as_bytes())
                    .await
                    .map_err(|e| EngineError::io(path, e))?;
            }
            Ok::<_, EngineError>(())
        }
    };
    write_opt("source_commit_id", &release.source_commit_id).await?;
    write_opt("source_author", &release.source_author).await?;
    write_opt("source_message", &release.source_message).await?;
    write_opt("display_version", &release.display_version).await?;

    for (env, manifest) in &release.manifests {
        let manifest_path = fs.join(&[&dir, "environments", env, "manifests.yaml"]);
        fs.write(&manifest_path, manifest.as_bytes())
            .await
            .map_err(|e| EngineError::io(manifest_path, e))?;
    }
    Ok(())
}

pub async fn delete_release<F: Filesystem>(fs: &F, app: &str, version: u64) -> EngineResult<()> {
    let dir = release_dir(fs, app, version);
    fs.remove(&dir).await.map_err(|e| EngineError::io(dir, e))
}

/// Environments this release has a manifest for, sorted.
pub fn release_environments(release: &Release) -> Vec<String> {
    release.manifests.keys().cloned().collect()
}

/// Collapse runs of ASCII whitespace to a single space for the idempotence
/// comparison, trimming leading and trailing whitespace.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
