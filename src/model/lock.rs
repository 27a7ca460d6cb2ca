//! Locks: `environments/<env>/locks/<lockId>/` (environment scope) and
//! `environments/<env>/applications/<app>/locks/<lockId>/` (application
//! scope). Environment-group locks are a fan-out over this module, not a
//! distinct entity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult, LockInfo};
use crate::fs::Filesystem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub lock_id: String,
    pub message: String,
    pub created_by_name: String,
    pub created_by_email: String,
    pub created_at_utc: DateTime<Utc>,
}

fn env_locks_dir<F: Filesystem>(fs: &F, env: &str) -> String {
    fs.join(&["environments", env, "locks"])
}

fn env_lock_dir<F: Filesystem>(fs: &F, env: &str, lock_id: &str) -> String {
    fs.join(&[&env_locks_dir(fs, env), lock_id])
}

fn app_locks_dir<F: Filesystem>(fs: &F, env: &str, app: &str) -> String {
    fs.join(&["environments", env, "applications", app, "locks"])
}

fn app_lock_dir<F: Filesystem>(fs: &F, env: &str, app: &str, lock_id: &str) -> String {
    fs.join(&[&app_locks_dir(fs, env, app), lock_id])
}

async fn write_lock<F: Filesystem>(fs: &F, dir: &str, lock: &Lock) -> EngineResult<()> {
    let message_path = fs.join(&[dir, "message"]);
    fs.write(&message_path, lock.message.as_bytes())
        .await
        .map_err(|e| EngineError::io(message_path, e))?;
    let name_path = fs.join(&[dir, "created_by_name"]);
    fs.write(&name_path, lock.created_by_name.as_bytes())
        .await
        .map_err(|e| EngineError::io(name_path, e))?;
    let email_path = fs.join(&[dir, "created_by_email"]);
    fs.write(&email_path, lock.created_by_email.as_bytes())
        .await
        .map_err(|e| EngineError::io(email_path, e))?;
    let at_path = fs.join(&[dir, "created_at_utc"]);
    fs.write(&at_path, lock.created_at_utc.to_rfc3339().as_bytes())
        .await
        .map_err(|e| EngineError::io(at_path, e))?;
    Ok(())
}

async fn read_lock<F: Filesystem>(fs: &F, dir: &str, lock_id: &str) -> EngineResult<Lock> {
    let read = |name: &'static str| {
        let path = fs.join(&[dir, name]);
        async move {
            fs.read(&path)
                .await
                .map(|b| String::from_utf8_lossy(&b).to_string())
                .map_err(|e| EngineError::io(path, e))
        }
    };
    let message = read("message").await?;
    let created_by_name = read("created_by_name").await?;
    let created_by_email = read("created_by_email").await?;
    let created_at_raw = read("created_at_utc").await?;
    let created_at_utc = DateTime::parse_from_rfc3339(&created_at_raw)
        .map_err(|e| EngineError::internal(format!("malformed created_at_utc at {dir}: {e}")))?
        .with_timezone(&Utc);
    Ok(Lock {
        lock_id: lock_id.to_string(),
        message,
        created_by_name,
        created_by_email,
        created_at_utc,
    })
}

/// Create or overwrite (updating message and provenance) an environment lock.
pub async fn create_environment_lock<F: Filesystem>(fs: &F, env: &str, lock: &Lock) -> EngineResult<()> {
    write_lock(fs, &env_lock_dir(fs, env, &lock.lock_id), lock).await
}

pub async fn delete_environment_lock<F: Filesystem>(fs: &F, env: &str, lock_id: &str) -> EngineResult<()> {
    let dir = env_lock_dir(fs, env, lock_id);
    if fs.stat(&dir).await.is_err() {
        return Err(EngineError::failed_precondition(format!(
            "environment lock \"{lock_id}\" does not exist on \"{env}\""
        )));
    }
    crate::fs::remove_lock_and_prune_parent(fs, &dir, &env_locks_dir(fs, env))
        .await
        .map_err(|e| EngineError::io(dir, e))
}

pub async fn create_environment_application_lock<F: Filesystem>(
    fs: &F,
    env: &str,
    app: &str,
    lock: &Lock,
) -> EngineResult<()> {
    write_lock(fs, &app_lock_dir(fs, env, app, &lock.lock_id), lock).await
}

pub async fn delete_environment_application_lock<F: Filesystem>(
    fs: &F,
    env: &str,
    app: &str,
    lock_id: &str,
) -> EngineResult<()> {
    let dir = app_lock_dir(fs, env, app, lock_id);
    if fs.stat(&dir).await.is_err() {
        return Err(EngineError::failed_precondition(format!(
            "application lock \"{lock_id}\" does not exist on \"{env}\"/\"{app}\""
        )));
    }
    crate::fs::remove_lock_and_prune_parent(fs, &dir, &app_locks_dir(fs, env, app))
        .await
        .map_err(|e| EngineError::io(dir, e))
}

/// All environment locks on `env`, keyed by lock id.
pub async fn environment_locks<F: Filesystem>(fs: &F, env: &str) -> EngineResult<BTreeMap<String, Lock>> {
    let dir = env_locks_dir(fs, env);
    let ids = crate::fs::list_names_or_empty(fs, &dir)
        .await
        .map_err(|e| EngineError::io(dir.clone(), e))?;
    let mut out = BTreeMap::new();
    for id in ids {
        let lock = read_lock(fs, &fs.join(&[&dir, &id]), &id).await?;
        out.insert(id, lock);
    }
    Ok(out)
}

/// All application locks on `(env, app)`, keyed by lock id.
pub async fn application_locks<F: Filesystem>(fs: &F, env: &str, app: &str) -> EngineResult<BTreeMap<String, Lock>> {
    let dir = app_locks_dir(fs, env, app);
    let ids = crate::fs::list_names_or_empty(fs, &dir)
        .await
        .map_err(|e| EngineError::io(dir.clone(), e))?;
    let mut out = BTreeMap::new();
    for id in ids {
        let lock = read_lock(fs, &fs.join(&[&dir, &id]), &id).await?;
        out.insert(id, lock);
    }
    Ok(out)
}

/// The union of environment and application locks applicable to a deploy on
/// `(env, app)`, expressed as the `LockInfo` maps an `EngineError::Locked`
/// carries.
pub async fn applicable_locks<F: Filesystem>(
    fs: &F,
    env: &str,
    app: &str,
) -> EngineResult<(BTreeMap<String, LockInfo>, BTreeMap<String, LockInfo>)> {
    let env_locks = environment_locks(fs, env)
        .await?
        .into_iter()
        .map(|(id, l)| {
            (
                id.clone(),
                LockInfo {
                    lock_id: id,
                    message: l.message,
                },
            )
        })
        .collect();
    let app_locks = application_locks(fs, env, app)
        .await?
        .into_iter()
        .map(|(id, l)| {
            (
                id.clone(),
                LockInfo {
                    lock_id: id,
                    message: l.message,
                },
            )
        })
        .collect();
    Ok((env_locks, app_locks))
}
