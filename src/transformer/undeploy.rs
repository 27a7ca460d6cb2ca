use std::collections::BTreeMap;

use crate::errors::{EngineError, EngineResult};
use crate::fs::Filesystem;
use crate::model::{commit_index, deployment, environment, release};

use super::create_application_version::{self, CreateApplicationVersionRequest};
use super::BatchContext;

/// Create a release whose manifest is a single space for every environment
/// the application's latest release currently targets, marking it as
/// intentionally undeployed there. Subject to the same idempotence,
/// retention and auto-deploy handling as any other release.
pub async fn create_undeploy_version<F: Filesystem>(ctx: &BatchContext<F>, app: &str) -> EngineResult<String> {
    let _span = tracing::info_span!("create_undeploy_application_version", app = %app).entered();

    let latest = release::latest_release_version(&ctx.fs, app)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("application \"{app}\" has no releases")))?;
    let current = release::read_release(&ctx.fs, app, latest).await?;
    let envs = release::release_environments(&current);

    for env in &envs {
        ctx.authorize("Undeploy", "Create", env).await?;
    }

    let mut manifests = BTreeMap::new();
    for env in envs {
        manifests.insert(env, " ".to_string());
    }

    let request = CreateApplicationVersionRequest {
        app: app.to_string(),
        manifests,
        version: None,
        source_commit_id: None,
        source_author: None,
        source_message: None,
        team: None,
        display_version: None,
        write_commit_data: false,
    };
    create_application_version::apply_as_undeploy_version(ctx, &request).await
}

/// Remove `app` entirely: every environment it is deployed to must already
/// be running its undeploy marker release.
pub async fn undeploy_application<F: Filesystem>(ctx: &BatchContext<F>, app: &str) -> EngineResult<String> {
    let _span = tracing::info_span!("undeploy_application", app = %app).entered();

    if !release::application_exists(&ctx.fs, app).await {
        return Err(EngineError::not_found(format!("application \"{app}\" does not exist")));
    }

    let latest = release::latest_release_version(&ctx.fs, app)
        .await?
        .ok_or_else(|| EngineError::failed_precondition(format!("application \"{app}\" has no releases")))?;
    let latest_release = release::read_release(&ctx.fs, app, latest).await?;
    if !release::is_undeploy_marker(&latest_release) {
        return Err(EngineError::failed_precondition(format!(
            "application \"{app}\"'s latest release is not an undeploy marker; run CreateUndeployApplicationVersion first"
        )));
    }

    let envs = environment::list_environments(&ctx.fs).await?;
    let mut deployed_envs = Vec::new();
    for env in &envs {
        if let Some(version) = deployment::deployed_version(&ctx.fs, env, app).await? {
            if version != latest {
                return Err(EngineError::failed_precondition(format!(
                    "application \"{app}\" is deployed at version {version} on \"{env}\", not the undeploy marker {latest}"
                )));
            }
            deployed_envs.push(env.clone());
        }
    }

    for env in &deployed_envs {
        ctx.authorize("Undeploy", "Delete", env).await?;
    }
    for env in &deployed_envs {
        deployment::undeploy(&ctx.fs, env, app).await?;
    }

    for version in release::list_release_versions(&ctx.fs, app).await? {
        if let Ok(release) = release::read_release(&ctx.fs, app, version).await {
            if let Some(source_commit_id) = &release.source_commit_id {
                commit_index::remove(&ctx.fs, source_commit_id, app).await?;
            }
        }
    }

    let dir = ctx.fs.join(&["applications", app]);
    ctx.fs.remove(&dir).await.map_err(|e| EngineError::io(dir, e))?;

    Ok(format!("Removed application '{app}'"))
}
