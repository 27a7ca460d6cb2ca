use crate::errors::{EngineError, EngineResult};
use crate::fs::Filesystem;
use crate::model::{deployment, lock};

use super::BatchContext;

/// How `DeployApplicationVersion` reacts when a lock blocks the deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockBehaviour {
    /// Return a lock error naming the offending lock ids.
    Fail,
    /// Proceed regardless, clearing any existing `queued_version`.
    Ignore,
    /// Leave `version` untouched; set `queued_version`, overwriting a prior one.
    Record,
    /// Used only by `CreateApplicationVersion`'s internal auto-deploy: like
    /// `Fail`, but a lock error is downgraded to `Record` rather than
    /// aborting the batch.
    FailSoft,
}

/// The deployment state machine: evaluates the union of environment and
/// application locks on `(env, app)` and dispatches on `lock_behaviour`.
pub async fn apply<F: Filesystem>(
    ctx: &BatchContext<F>,
    env: &str,
    app: &str,
    version: u64,
    lock_behaviour: LockBehaviour,
) -> EngineResult<String> {
    let _span = tracing::info_span!("deploy_application_version", env = %env, app = %app, version = version).entered();

    let (env_locks, app_locks) = lock::applicable_locks(&ctx.fs, env, app).await?;
    let locked = !env_locks.is_empty() || !app_locks.is_empty();

    if locked {
        match lock_behaviour {
            LockBehaviour::Fail => {
                return Err(EngineError::Locked { env_locks, app_locks });
            }
            LockBehaviour::FailSoft => {
                deployment::set_queued_version(&ctx.fs, env, app, version).await?;
                return Ok(format!(
                    "Version {version} of app '{app}' is locked on '{env}' - queued instead"
                ));
            }
            LockBehaviour::Record => {
                deployment::set_queued_version(&ctx.fs, env, app, version).await?;
                return Ok(format!(
                    "Version {version} of app '{app}' is locked on '{env}' - queued"
                ));
            }
            LockBehaviour::Ignore => {
                deployment::clear_queued_version(&ctx.fs, env, app).await?;
            }
        }
    }

    let deployment = deployment::Deployment {
        version,
        deployed_by: ctx.identity.name.clone(),
        deployed_by_email: ctx.identity.email.clone(),
        deployed_at_utc: ctx.clock.now(),
        source_train_upstream: None,
    };
    deployment::deploy(&ctx.fs, env, app, version, &deployment).await?;
    deployment::clear_queued_version(&ctx.fs, env, app).await?;

    Ok(format!("Deployed version {version} of '{app}' to '{env}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::EngineConfig;
    use crate::fs::memory::MemoryFilesystem;
    use crate::identity::Identity;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    fn ctx() -> BatchContext<MemoryFilesystem> {
        BatchContext::new(
            MemoryFilesystem::new(),
            Arc::new(FixedClock(
                DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            )),
            Identity::new("alice", "alice@example.com"),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn unlocked_deploy_sets_version_and_clears_queue() {
        let ctx = ctx();
        apply(&ctx, "acceptance", "app1", 1, LockBehaviour::Fail).await.unwrap();
        assert_eq!(
            deployment::deployed_version(&ctx.fs, "acceptance", "app1").await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn fail_behaviour_returns_locked_error() {
        let ctx = ctx();
        lock::create_environment_lock(
            &ctx.fs,
            "acceptance",
            &lock::Lock {
                lock_id: "l1".to_string(),
                message: "no deploys".to_string(),
                created_by_name: "alice".to_string(),
                created_by_email: "alice@example.com".to_string(),
                created_at_utc: ctx.clock.now(),
            },
        )
        .await
        .unwrap();
        let err = apply(&ctx, "acceptance", "app1", 1, LockBehaviour::Fail).await.unwrap_err();
        assert!(matches!(err, EngineError::Locked { .. }));
    }

    #[tokio::test]
    async fn record_behaviour_queues_without_changing_version() {
        let ctx = ctx();
        lock::create_environment_lock(
            &ctx.fs,
            "acceptance",
            &lock::Lock {
                lock_id: "l1".to_string(),
                message: "no deploys".to_string(),
                created_by_name: "alice".to_string(),
                created_by_email: "alice@example.com".to_string(),
                created_at_utc: ctx.clock.now(),
            },
        )
        .await
        .unwrap();
        apply(&ctx, "acceptance", "app1", 1, LockBehaviour::Record).await.unwrap();
        assert_eq!(
            deployment::deployed_version(&ctx.fs, "acceptance", "app1").await.unwrap(),
            None
        );
        assert_eq!(
            deployment::queued_version(&ctx.fs, "acceptance", "app1").await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn ignore_behaviour_deploys_and_clears_queue() {
        let ctx = ctx();
        lock::create_environment_lock(
            &ctx.fs,
            "acceptance",
            &lock::Lock {
                lock_id: "l1".to_string(),
                message: "no deploys".to_string(),
                created_by_name: "alice".to_string(),
                created_by_email: "alice@example.com".to_string(),
                created_at_utc: ctx.clock.now(),
            },
        )
        .await
        .unwrap();
        apply(&ctx, "acceptance", "app1", 1, LockBehaviour::Ignore).await.unwrap();
        assert_eq!(
            deployment::deployed_version(&ctx.fs, "acceptance", "app1").await.unwrap(),
            Some(1)
        );
        assert_eq!(
            deployment::queued_version(&ctx.fs, "acceptance", "app1").await.unwrap(),
            None
        );
    }
}
