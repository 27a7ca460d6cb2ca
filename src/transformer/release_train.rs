use std::collections::BTreeMap;

use crate::errors::EngineResult;
use crate::fs::Filesystem;
use crate::model::environment::{self, UpstreamKind};
use crate::model::{deployment, lock, release};

use super::deploy::LockBehaviour;
use super::BatchContext;

/// The outcome of running a release train against one or more environments:
/// which applications were promoted on each, and the full, ready-to-print
/// skip line for everything that wasn't (keyed by the application name, or
/// empty when the entire environment was skipped before any app was
/// considered).
#[derive(Debug, Clone, Default)]
pub struct ReleaseTrainReport {
    pub promoted: BTreeMap<String, Vec<String>>,
    pub skipped: BTreeMap<String, Vec<(String, String)>>,
    pub message: String,
}

/// Every application that currently has at least one release.
async fn all_applications<F: Filesystem>(fs: &F) -> EngineResult<Vec<String>> {
    crate::fs::list_names_or_empty(fs, "applications")
        .await
        .map_err(|e| crate::errors::EngineError::io("applications", e))
}

/// Resolve `target` to the environments it drives: its group members if any
/// declare that group, else the single environment named `target`.
async fn target_environments<F: Filesystem>(fs: &F, target: &str) -> EngineResult<Vec<String>> {
    let members = environment::environments_in_group(fs, target).await?;
    if !members.is_empty() {
        return Ok(members);
    }
    if environment::environment_exists(fs, target).await {
        return Ok(vec![target.to_string()]);
    }
    Ok(Vec::new())
}

async fn run_one_environment<F: Filesystem>(
    ctx: &BatchContext<F>,
    env: &str,
    team: Option<&str>,
    report: &mut ReleaseTrainReport,
) -> EngineResult<()> {
    let config = match environment::read_environment_config(&ctx.fs, env).await {
        Ok(c) => c,
        Err(_) => {
            report.skipped.entry(env.to_string()).or_default().push((
                String::new(),
                format!("Environment '\"{env}\"' does not have upstream configured - skipping."),
            ));
            return Ok(());
        }
    };

    let kind = config.upstream.as_ref().map(|u| u.kind());
    let candidates: Vec<(String, u64)> = match kind {
        None => {
            report.skipped.entry(env.to_string()).or_default().push((
                String::new(),
                format!("Environment '\"{env}\"' does not have upstream configured - skipping."),
            ));
            return Ok(());
        }
        Some(UpstreamKind::Neither) => {
            report.skipped.entry(env.to_string()).or_default().push((
                String::new(),
                format!("Environment \"{env}\" does not have upstream.latest or upstream.environment configured - skipping."),
            ));
            return Ok(());
        }
        Some(UpstreamKind::Both) => {
            report.skipped.entry(env.to_string()).or_default().push((
                String::new(),
                format!("Environment \"{env}\" has both upstream.latest and upstream.environment configured - skipping."),
            ));
            return Ok(());
        }
        Some(UpstreamKind::Latest) => {
            let mut out = Vec::new();
            for app in all_applications(&ctx.fs).await? {
                if let Some(version) = release::latest_release_version(&ctx.fs, &app).await? {
                    out.push((app, version));
                }
            }
            out
        }
        Some(UpstreamKind::Environment(upstream_env)) => {
            let mut out = Vec::new();
            for app in deployment::deployed_applications(&ctx.fs, &upstream_env).await? {
                if let Some(version) = deployment::deployed_version(&ctx.fs, &upstream_env, &app).await? {
                    out.push((app, version));
                }
            }
            out
        }
    };

    let env_locks = lock::environment_locks(&ctx.fs, env).await?;
    if !env_locks.is_empty() {
        report.skipped.entry(env.to_string()).or_default().push((
            String::new(),
            format!("Target Environment '{env}' is locked - skipping."),
        ));
        return Ok(());
    }

    for (app, version) in candidates {
        if let Some(team) = team {
            match release::read_team(&ctx.fs, &app).await? {
                Some(app_team) if app_team == team => {}
                _ => continue,
            }
        }

        let current = deployment::deployed_version(&ctx.fs, env, &app).await?;
        if current == Some(version) {
            continue;
        }

        ctx.authorize("Deploy", "Create", env).await?;

        let (env_locks, app_locks) = lock::applicable_locks(&ctx.fs, env, &app).await?;
        if !env_locks.is_empty() || !app_locks.is_empty() {
            report.skipped.entry(env.to_string()).or_default().push((
                app.clone(),
                format!("Application '{app}' is locked on environment '{env}' - skipping."),
            ));
            continue;
        }

        super::deploy::apply(ctx, env, &app, version, LockBehaviour::Ignore).await?;
        report.promoted.entry(env.to_string()).or_default().push(app);
    }

    Ok(())
}

pub async fn apply<F: Filesystem>(ctx: &BatchContext<F>, target: &str, team: Option<&str>) -> EngineResult<ReleaseTrainReport> {
    let _span = tracing::info_span!("release_train", target = %target).entered();

    let envs = target_environments(&ctx.fs, target).await?;
    let mut report = ReleaseTrainReport::default();
    if envs.is_empty() {
        report.message = format!("Release train to '{target}': no matching environment");
        return Ok(report);
    }

    for env in &envs {
        run_one_environment(ctx, env, team, &mut report).await?;
    }

    report.message = render_message(target, &envs, &report);
    Ok(report)
}

/// Build the commit message: one section per environment, listing promoted
/// services and skipped services (with the skip reason already baked into
/// each line by [`run_one_environment`]) separately.
fn render_message(target: &str, envs: &[String], report: &ReleaseTrainReport) -> String {
    let mut message = format!("Release Train to environment/environment group '{target}':\n");
    for env in envs {
        message.push_str(&format!("\nRelease Train to '{env}' environment:\n"));

        if let Some(apps) = report.promoted.get(env) {
            if !apps.is_empty() {
                message.push_str("\nPromoted services:\n");
                for app in apps {
                    message.push_str(&format!("'{app}' was deployed to '{env}'\n"));
                }
            }
        }

        if let Some(lines) = report.skipped.get(env) {
            if !lines.is_empty() {
                message.push_str("\nSkipped services:\n");
                for (_, line) in lines {
                    message.push_str(line);
                    message.push('\n');
                }
            }
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::EngineConfig;
    use crate::fs::memory::MemoryFilesystem;
    use crate::identity::Identity;
    use crate::model::environment::{EnvironmentConfig, EnvironmentConfigUpstream};
    use std::sync::Arc;

    fn ctx() -> BatchContext<MemoryFilesystem> {
        BatchContext::new(
            MemoryFilesystem::new(),
            Arc::new(SystemClock),
            Identity::system(),
            EngineConfig::default(),
        )
    }

    async fn deploy_fixture<F: Filesystem>(ctx: &BatchContext<F>, env: &str, app: &str, version: u64) {
        deployment::deploy(
            &ctx.fs,
            env,
            app,
            version,
            &deployment::Deployment {
                version,
                deployed_by: "alice".to_string(),
                deployed_by_email: "alice@example.com".to_string(),
                deployed_at_utc: ctx.clock.now(),
                source_train_upstream: None,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn promotes_from_upstream_environment() {
        let ctx = ctx();
        environment::write_environment_config(&ctx.fs, "staging", &EnvironmentConfig::default())
            .await
            .unwrap();
        environment::write_environment_config(
            &ctx.fs,
            "production",
            &EnvironmentConfig {
                upstream: Some(EnvironmentConfigUpstream {
                    latest: false,
                    environment: Some("staging".to_string()),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        deploy_fixture(&ctx, "staging", "app1", 5).await;

        let report = apply(&ctx, "production", None).await.unwrap();
        assert_eq!(report.promoted.get("production"), Some(&vec!["app1".to_string()]));
        assert_eq!(
            deployment::deployed_version(&ctx.fs, "production", "app1").await.unwrap(),
            Some(5)
        );
    }

    #[tokio::test]
    async fn skips_environment_with_no_upstream() {
        let ctx = ctx();
        environment::write_environment_config(&ctx.fs, "production", &EnvironmentConfig::default())
            .await
            .unwrap();
        let report = apply(&ctx, "production", None).await.unwrap();
        assert!(report.promoted.is_empty());
        assert_eq!(
            report.skipped.get("production").unwrap()[0].1,
            "Environment '\"production\"' does not have upstream configured - skipping."
        );
    }

    #[tokio::test]
    async fn already_up_to_date_app_is_neither_promoted_nor_skipped() {
        let ctx = ctx();
        environment::write_environment_config(&ctx.fs, "staging", &EnvironmentConfig::default())
            .await
            .unwrap();
        environment::write_environment_config(
            &ctx.fs,
            "production",
            &EnvironmentConfig {
                upstream: Some(EnvironmentConfigUpstream {
                    latest: false,
                    environment: Some("staging".to_string()),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        deploy_fixture(&ctx, "staging", "app1", 5).await;
        deploy_fixture(&ctx, "production", "app1", 5).await;

        let report = apply(&ctx, "production", None).await.unwrap();
        assert!(report.promoted.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn locked_environment_skips_all_candidates() {
        let ctx = ctx();
        environment::write_environment_config(&ctx.fs, "staging", &EnvironmentConfig::default())
            .await
            .unwrap();
        environment::write_environment_config(
            &ctx.fs,
            "production",
            &EnvironmentConfig {
                upstream: Some(EnvironmentConfigUpstream {
                    latest: false,
                    environment: Some("staging".to_string()),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        deploy_fixture(&ctx, "staging", "app1", 5).await;
        lock::create_environment_lock(
            &ctx.fs,
            "production",
            &lock::Lock {
                lock_id: "l1".to_string(),
                message: "freeze".to_string(),
                created_by_name: "alice".to_string(),
                created_by_email: "alice@example.com".to_string(),
                created_at_utc: ctx.clock.now(),
            },
        )
        .await
        .unwrap();

        let report = apply(&ctx, "production", None).await.unwrap();
        assert!(report.promoted.is_empty());
        assert_eq!(
            report.skipped.get("production").unwrap()[0].1,
            "Target Environment 'production' is locked - skipping."
        );
    }

    #[tokio::test]
    async fn message_lists_promoted_and_skipped_lines_per_environment() {
        let ctx = ctx();
        environment::write_environment_config(&ctx.fs, "staging", &EnvironmentConfig::default())
            .await
            .unwrap();
        environment::write_environment_config(
            &ctx.fs,
            "production",
            &EnvironmentConfig {
                upstream: Some(EnvironmentConfigUpstream {
                    latest: false,
                    environment: Some("staging".to_string()),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        deploy_fixture(&ctx, "staging", "app1", 5).await;

        let report = apply(&ctx, "production", None).await.unwrap();
        assert!(report.message.contains("Release Train to environment/environment group 'production':"));
        assert!(report.message.contains("Release Train to 'production' environment:"));
        assert!(report.message.contains("'app1' was deployed to 'production'"));
    }

    #[tokio::test]
    async fn message_reports_upstream_kind_skip_reasons_verbatim() {
        let ctx1 = ctx();
        environment::write_environment_config(
            &ctx1.fs,
            "production",
            &EnvironmentConfig {
                upstream: Some(EnvironmentConfigUpstream {
                    latest: false,
                    environment: None,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let report = apply(&ctx1, "production", None).await.unwrap();
        assert!(report
            .message
            .contains("Environment \"production\" does not have upstream.latest or upstream.environment configured - skipping."));

        let ctx2 = ctx();
        environment::write_environment_config(
            &ctx2.fs,
            "production",
            &EnvironmentConfig {
                upstream: Some(EnvironmentConfigUpstream {
                    latest: true,
                    environment: Some("staging".to_string()),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let report = apply(&ctx2, "production", None).await.unwrap();
        assert!(report
            .message
            .contains("Environment \"production\" has both upstream.latest and upstream.environment configured - skipping."));
    }
}
