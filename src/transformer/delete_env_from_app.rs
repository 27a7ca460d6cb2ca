use crate::errors::{EngineError, EngineResult};
use crate::fs::Filesystem;
use crate::model::{commit_index, deployment, release};

use super::BatchContext;

/// Remove `app` from `env` entirely: its deployment, locks, and the inverse
/// commit-index entry for whichever release it was running there.
pub async fn apply<F: Filesystem>(ctx: &BatchContext<F>, env: &str, app: &str) -> EngineResult<String> {
    let _span = tracing::info_span!("delete_environment_application", env = %env, app = %app).entered();

    let dir = ctx.fs.join(&["environments", env, "applications", app]);
    if ctx.fs.stat(&dir).await.is_err() {
        return Ok(format!(
            "Attempted to remove environment '{env}' from application '{app}' but it did not exist."
        ));
    }

    if let Some(version) = deployment::deployed_version(&ctx.fs, env, app).await? {
        if let Ok(release) = release::read_release(&ctx.fs, app, version).await {
            if let Some(source_commit_id) = &release.source_commit_id {
                commit_index::remove(&ctx.fs, source_commit_id, app).await?;
            }
        }
    }

    ctx.fs.remove(&dir).await.map_err(|e| EngineError::io(dir, e))?;
    Ok(format!("Environment '{env}' was removed from application '{app}' successfully."))
}
