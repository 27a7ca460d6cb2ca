//! The Transformer pipeline: twelve atomic, named mutations against a
//! shared filesystem snapshot, applied sequentially by the batch engine
//! under a single commit. On the first error the batch is aborted and the
//! commit is never written.

mod create_application_version;
mod create_environment;
mod delete_env_from_app;
mod deploy;
mod locks;
mod release_train;
mod undeploy;

pub use create_application_version::CreateApplicationVersionRequest;
pub use deploy::LockBehaviour;
pub use release_train::ReleaseTrainReport;

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::errors::EngineResult;
use crate::fs::Filesystem;
use crate::identity::Identity;
use crate::policy::RbacPolicy;

/// Everything a Transformer needs besides its own typed input: the shared
/// mutable filesystem, the injected clock and identity, engine
/// configuration, and the optional RBAC policy.
pub struct BatchContext<F: Filesystem> {
    pub fs: F,
    pub clock: Arc<dyn Clock>,
    pub identity: Identity,
    pub config: EngineConfig,
    pub rbac: Option<RbacPolicy>,
}

impl<F: Filesystem> BatchContext<F> {
    pub fn new(fs: F, clock: Arc<dyn Clock>, identity: Identity, config: EngineConfig) -> Self {
        BatchContext {
            fs,
            clock,
            identity,
            config,
            rbac: None,
        }
    }

    pub fn with_rbac(mut self, rbac: RbacPolicy) -> Self {
        self.rbac = Some(rbac);
        self
    }

    /// Look up `env`'s configured group (empty string if the environment
    /// has none or does not exist yet) and check whether the current
    /// identity may perform `action` on `application` there.
    async fn authorize(&self, application: &str, action: &str, env: &str) -> EngineResult<()> {
        let role = self.identity.role.as_deref().unwrap_or("");
        let group = crate::model::environment::read_environment_config(&self.fs, env)
            .await
            .ok()
            .and_then(|cfg| cfg.environment_group)
            .unwrap_or_default();
        crate::policy::check_permission(self.rbac.as_ref(), role, application, action, &group, env)
    }

    /// Like [`authorize`](Self::authorize), but for group-scoped lock
    /// fan-outs where the group is already known.
    fn authorize_in_group(&self, application: &str, action: &str, group: &str, env: &str) -> EngineResult<()> {
        let role = self.identity.role.as_deref().unwrap_or("");
        crate::policy::check_permission(self.rbac.as_ref(), role, application, action, group, env)
    }
}

/// The enumerated set of mutations the engine can apply.
pub enum Transformer {
    CreateEnvironment {
        env: String,
        config: crate::model::environment::EnvironmentConfig,
    },
    CreateApplicationVersion(CreateApplicationVersionRequest),
    CreateUndeployApplicationVersion {
        app: String,
    },
    UndeployApplication {
        app: String,
    },
    DeployApplicationVersion {
        env: String,
        app: String,
        version: u64,
        lock_behaviour: LockBehaviour,
    },
    CreateEnvironmentLock {
        env: String,
        lock_id: String,
        message: String,
    },
    DeleteEnvironmentLock {
        env: String,
        lock_id: String,
    },
    CreateEnvironmentApplicationLock {
        env: String,
        app: String,
        lock_id: String,
        message: String,
    },
    DeleteEnvironmentApplicationLock {
        env: String,
        app: String,
        lock_id: String,
    },
    CreateEnvironmentGroupLock {
        group: String,
        lock_id: String,
        message: String,
    },
    DeleteEnvironmentGroupLock {
        group: String,
        lock_id: String,
    },
    DeleteEnvFromApp {
        env: String,
        app: String,
    },
    ReleaseTrain {
        target: String,
        team: Option<String>,
    },
}

/// Apply a single Transformer, returning the commit-message fragment it
/// contributes. Authorization is checked before the mutation runs.
pub async fn apply<F: Filesystem>(ctx: &BatchContext<F>, transformer: &Transformer) -> EngineResult<String> {
    match transformer {
        Transformer::CreateEnvironment { env, config } => {
            create_environment::apply(ctx, env, config).await
        }
        Transformer::CreateApplicationVersion(request) => {
            create_application_version::apply(ctx, request).await
        }
        Transformer::CreateUndeployApplicationVersion { app } => {
            undeploy::create_undeploy_version(ctx, app).await
        }
        Transformer::UndeployApplication { app } => {
            undeploy::undeploy_application(ctx, app).await
        }
        Transformer::DeployApplicationVersion {
            env,
            app,
            version,
            lock_behaviour,
        } => {
            ctx.authorize("Deploy", "Create", env).await?;
            deploy::apply(ctx, env, app, *version, *lock_behaviour).await
        }
        Transformer::CreateEnvironmentLock { env, lock_id, message } => {
            ctx.authorize("EnvironmentLock", "Create", env).await?;
            locks::create_environment_lock(ctx, env, lock_id, message).await
        }
        Transformer::DeleteEnvironmentLock { env, lock_id } => {
            ctx.authorize("EnvironmentLock", "Delete", env).await?;
            locks::delete_environment_lock(ctx, env, lock_id).await
        }
        Transformer::CreateEnvironmentApplicationLock {
            env,
            app,
            lock_id,
            message,
        } => {
            ctx.authorize("EnvironmentApplicationLock", "Create", env).await?;
            locks::create_environment_application_lock(ctx, env, app, lock_id, message).await
        }
        Transformer::DeleteEnvironmentApplicationLock { env, app, lock_id } => {
            ctx.authorize("EnvironmentApplicationLock", "Delete", env).await?;
            locks::delete_environment_application_lock(ctx, env, app, lock_id).await
        }
        Transformer::CreateEnvironmentGroupLock { group, lock_id, message } => {
            locks::create_environment_group_lock(ctx, group, lock_id, message).await
        }
        Transformer::DeleteEnvironmentGroupLock { group, lock_id } => {
            locks::delete_environment_group_lock(ctx, group, lock_id).await
        }
        Transformer::DeleteEnvFromApp { env, app } => {
            ctx.authorize("EnvironmentFromApplication", "Delete", env).await?;
            delete_env_from_app::apply(ctx, env, app).await
        }
        Transformer::ReleaseTrain { target, team } => {
            let report = release_train::apply(ctx, target, team.as_deref()).await?;
            Ok(report.message)
        }
    }
}
