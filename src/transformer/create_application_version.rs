use std::collections::BTreeMap;

use crate::errors::{EngineError, EngineResult};
use crate::fs::Filesystem;
use crate::model::release::{self, Release};

use super::deploy::{self, LockBehaviour};
use super::BatchContext;

/// Input to `CreateApplicationVersion`.
#[derive(Debug, Clone)]
pub struct CreateApplicationVersionRequest {
    pub app: String,
    /// Manifest text per targeted environment.
    pub manifests: BTreeMap<String, String>,
    pub version: Option<u64>,
    pub source_commit_id: Option<String>,
    pub source_author: Option<String>,
    pub source_message: Option<String>,
    pub team: Option<String>,
    pub display_version: Option<String>,
    pub write_commit_data: bool,
}

fn first_differing_field(existing: &Release, request: &CreateApplicationVersionRequest) -> Option<(String, String, String)> {
    if existing.source_commit_id != request.source_commit_id {
        return Some((
            "source_commit_id".to_string(),
            existing.source_commit_id.clone().unwrap_or_default(),
            request.source_commit_id.clone().unwrap_or_default(),
        ));
    }
    if existing.source_author != request.source_author {
        return Some((
            "source_author".to_string(),
            existing.source_author.clone().unwrap_or_default(),
            request.source_author.clone().unwrap_or_default(),
        ));
    }
    if existing.source_message != request.source_message {
        return Some((
            "source_message".to_string(),
            existing.source_message.clone().unwrap_or_default(),
            request.source_message.clone().unwrap_or_default(),
        ));
    }
    if existing.display_version != request.display_version {
        return Some((
            "display_version".to_string(),
            existing.display_version.clone().unwrap_or_default(),
            request.display_version.clone().unwrap_or_default(),
        ));
    }
    for (env, manifest) in &request.manifests {
        let existing_manifest = existing.manifests.get(env).cloned().unwrap_or_default();
        if release::normalize_whitespace(&existing_manifest) != release::normalize_whitespace(manifest) {
            return Some((format!("manifest[{env}]"), existing_manifest, manifest.clone()));
        }
    }
    for env in existing.manifests.keys() {
        if !request.manifests.contains_key(env) {
            return Some((format!("manifest[{env}]"), existing.manifests[env].clone(), String::new()));
        }
    }
    None
}

pub async fn apply<F: Filesystem>(
    ctx: &BatchContext<F>,
    request: &CreateApplicationVersionRequest,
) -> EngineResult<String> {
    apply_with_headline(ctx, request, |version, app| format!("created version {version} of \"{app}\"")).await
}

/// Same pipeline as [`apply`], but with the commit-message headline an
/// undeploy-marker release uses instead of a regular one.
pub(crate) async fn apply_as_undeploy_version<F: Filesystem>(
    ctx: &BatchContext<F>,
    request: &CreateApplicationVersionRequest,
) -> EngineResult<String> {
    apply_with_headline(ctx, request, |version, app| format!("created undeploy-version {version} of '{app}'")).await
}

async fn apply_with_headline<F: Filesystem>(
    ctx: &BatchContext<F>,
    request: &CreateApplicationVersionRequest,
    headline: impl FnOnce(u64, &str) -> String,
) -> EngineResult<String> {
    let _span = tracing::info_span!("create_application_version", app = %request.app).entered();

    let latest = release::latest_release_version(&ctx.fs, &request.app).await?;
    let version = match request.version {
        Some(v) => v,
        None => latest.map(|v| v + 1).unwrap_or(1),
    };

    if let Some(latest) = latest {
        let limit = ctx.config.release_versions_limit as u64;
        if version < latest.saturating_sub(limit) {
            return Err(EngineError::TooOld {
                version,
                latest,
                kept: ctx.config.release_versions_limit,
            });
        }
    }

    if let Ok(existing) = release::read_release(&ctx.fs, &request.app, version).await {
        return match first_differing_field(&existing, request) {
            None => Err(EngineError::AlreadyExistsSame),
            Some((field, before, after)) => {
                let diff = similar::TextDiff::from_lines(&before, &after)
                    .unified_diff()
                    .header("before", "after")
                    .to_string();
                Err(EngineError::AlreadyExistsDifferent {
                    first_differing_field: field,
                    diff,
                })
            }
        };
    }

    if let Some(team) = &request.team {
        release::write_team(&ctx.fs, &request.app, team).await?;
    }

    let new_release = Release {
        version,
        source_commit_id: request.source_commit_id.clone(),
        source_author: request.source_author.clone(),
        source_message: request.source_message.clone(),
        display_version: request.display_version.clone(),
        manifests: request.manifests.clone(),
    };
    release::write_release(&ctx.fs, &request.app, &new_release).await?;

    if let Some(source_commit_id) = &request.source_commit_id {
        let message = request
            .write_commit_data
            .then(|| request.source_message.as_deref())
            .flatten();
        crate::model::commit_index::record(&ctx.fs, source_commit_id, &request.app, message).await?;
    }

    let mut auto_deploy_notes = Vec::new();
    for env in request.manifests.keys() {
        let env_config = match crate::model::environment::read_environment_config(&ctx.fs, env).await {
            Ok(config) => config,
            Err(EngineError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        let selects_latest = matches!(
            env_config.upstream.as_ref().map(|u| u.kind()),
            Some(crate::model::environment::UpstreamKind::Latest)
        );
        if selects_latest {
            let note = deploy::apply(ctx, env, &request.app, version, LockBehaviour::FailSoft).await?;
            auto_deploy_notes.push(note);
        }
    }

    cleanup_old_releases(ctx, &request.app).await?;

    Ok(format!(
        "{}{}",
        headline(version, &request.app),
        if auto_deploy_notes.is_empty() {
            String::new()
        } else {
            format!("\n{}", auto_deploy_notes.join("\n"))
        }
    ))
}

async fn cleanup_old_releases<F: Filesystem>(ctx: &BatchContext<F>, app: &str) -> EngineResult<()> {
    let limit = ctx.config.release_versions_limit as usize;
    let mut versions = release::list_release_versions(&ctx.fs, app).await?;
    while versions.len() > limit {
        let oldest = versions.remove(0);
        if let Ok(release) = release::read_release(&ctx.fs, app, oldest).await {
            if let Some(source_commit_id) = &release.source_commit_id {
                crate::model::commit_index::remove(&ctx.fs, source_commit_id, app).await?;
            }
        }
        release::delete_release(&ctx.fs, app, oldest).await?;
    }
    Ok(())
}
