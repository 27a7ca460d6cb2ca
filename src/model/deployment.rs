//! Deployments: `environments/<env>/applications/<app>/version` symlinks and
//! their provenance files.

use chrono::{DateTime, Utc};

use crate::errors::{EngineError, EngineResult};
use crate::fs::Filesystem;

/// The deployed version of one application on one environment, plus who
/// deployed it and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub version: u64,
    pub deployed_by: String,
    pub deployed_by_email: String,
    pub deployed_at_utc: DateTime<Utc>,
    pub source_train_upstream: Option<String>,
}

fn app_dir<F: Filesystem>(fs: &F, env: &str, app: &str) -> String {
    fs.join(&["environments", env, "applications", app])
}

fn version_link<F: Filesystem>(fs: &F, env: &str, app: &str) -> String {
    fs.join(&[&app_dir(fs, env, app), "version"])
}

/// The relative symlink target for `version`, pointing at the release
/// directory from the environment/application leaf.
fn version_target(app: &str, version: u64) -> String {
    format!("../../../../applications/{app}/releases/{version}")
}

/// The currently deployed version, or `None` if the application has never
/// been deployed to this environment.
pub async fn deployed_version<F: Filesystem>(fs: &F, env: &str, app: &str) -> EngineResult<Option<u64>> {
    let link = version_link(fs, env, app);
    match fs.read_link(&link).await {
        Ok(target) => {
            let version = target
                .rsplit('/')
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| {
                    EngineError::internal(format!("malformed version symlink target \"{target}\" at {link}"))
                })?;
            Ok(Some(version))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EngineError::io(link, e)),
    }
}

/// Point `version` at `version`, overwriting any prior deployment, and
/// record provenance alongside it.
pub async fn deploy<F: Filesystem>(
    fs: &F,
    env: &str,
    app: &str,
    version: u64,
    deployment: &Deployment,
) -> EngineResult<()> {
    let dir = app_dir(fs, env, app);
    let link = version_link(fs, env, app);
    if fs.stat(&link).await.is_ok() {
        fs.remove(&link).await.map_err(|e| EngineError::io(link.clone(), e))?;
    }
    fs.symlink(&link, &version_target(app, version))
        .await
        .map_err(|e| EngineError::io(link, e))?;

    let deployed_by_path = fs.join(&[&dir, "deployed_by"]);
    fs.write(&deployed_by_path, deployment.deployed_by.as_bytes())
        .await
        .map_err(|e| EngineError::io(deployed_by_path, e))?;

    let deployed_by_email_path = fs.join(&[&dir, "deployed_by_email"]);
    fs.write(&deployed_by_email_path, deployment.deployed_by_email.as_bytes())
        .await
        .map_err(|e| EngineError::io(deployed_by_email_path, e))?;

    let deployed_at_path = fs.join(&[&dir, "deployed_at_utc"]);
    fs.write(&deployed_at_path, deployment.deployed_at_utc.to_rfc3339().as_bytes())
        .await
        .map_err(|e| EngineError::io(deployed_at_path, e))?;

    if let Some(upstream) = &deployment.source_train_upstream {
        let train_path = fs.join(&[&dir, "source_train_upstream"]);
        fs.write(&train_path, upstream.as_bytes())
            .await
            .map_err(|e| EngineError::io(train_path, e))?;
    }
    Ok(())
}

/// Remove the `version` symlink and provenance files, leaving the
/// application absent from the environment (used by undeploy).
pub async fn undeploy<F: Filesystem>(fs: &F, env: &str, app: &str) -> EngineResult<()> {
    let link = version_link(fs, env, app);
    if fs.stat(&link).await.is_ok() {
        fs.remove(&link).await.map_err(|e| EngineError::io(link, e))?;
    }
    for name in [
        "deployed_by",
        "deployed_by_email",
        "deployed_at_utc",
        "source_train_upstream",
    ] {
        let path = fs.join(&[&app_dir(fs, env, app), name]);
        if fs.stat(&path).await.is_ok() {
            fs.remove(&path).await.map_err(|e| EngineError::io(path, e))?;
        }
    }
    Ok(())
}

/// The queued version recorded because a lock blocked the most recent
/// deploy attempt, or `None` if nothing is queued.
pub async fn queued_version<F: Filesystem>(fs: &F, env: &str, app: &str) -> EngineResult<Option<u64>> {
    let link = fs.join(&[&app_dir(fs, env, app), "queued_version"]);
    match fs.read_link(&link).await {
        Ok(target) => {
            let version = target
                .rsplit('/')
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| {
                    EngineError::internal(format!("malformed queued_version symlink target \"{target}\" at {link}"))
                })?;
            Ok(Some(version))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EngineError::io(link, e)),
    }
}

/// Record that `version` was blocked by a lock and should be applied once
/// the lock clears.
pub async fn set_queued_version<F: Filesystem>(fs: &F, env: &str, app: &str, version: u64) -> EngineResult<()> {
    let link = fs.join(&[&app_dir(fs, env, app), "queued_version"]);
    if fs.stat(&link).await.is_ok() {
        fs.remove(&link).await.map_err(|e| EngineError::io(link.clone(), e))?;
    }
    fs.symlink(&link, &version_target(app, version))
        .await
        .map_err(|e| EngineError::io(link, e))
}

/// Clear a queued version, e.g. once a deploy actually takes effect.
pub async fn clear_queued_version<F: Filesystem>(fs: &F, env: &str, app: &str) -> EngineResult<()> {
    let link = fs.join(&[&app_dir(fs, env, app), "queued_version"]);
    if fs.stat(&link).await.is_ok() {
        fs.remove(&link).await.map_err(|e| EngineError::io(link, e))?;
    }
    Ok(())
}

/// Every application deployed (with any version) on an environment, sorted.
pub async fn deployed_applications<F: Filesystem>(fs: &F, env: &str) -> EngineResult<Vec<String>> {
    let dir = fs.join(&["environments", env, "applications"]);
    let names = crate::fs::list_names_or_empty(fs, &dir)
        .await
        .map_err(|e| EngineError::io(dir, e))?;
    let mut out = Vec::new();
    for name in names {
        if deployed_version(fs, env, &name).await?.is_some() {
            out.push(name);
        }
    }
    Ok(out)
}
