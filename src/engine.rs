//! The batch engine: wires a [`CommitStore`] to the transformer pipeline,
//! applying a caller-supplied list of [`Transformer`]s sequentially against
//! the live working tree under a single writer, aborting on the first error
//! and otherwise emitting exactly one commit.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::errors::EngineResult;
use crate::fs::{Filesystem, Snapshotable};
use crate::hash::CommitHash;
use crate::identity::Identity;
use crate::metrics::{MetricEvent, MetricsSink, NoopSink};
use crate::policy::RbacPolicy;
use crate::model::event::{self, EventType};
use crate::store::{CommitMetadata, CommitStore};
use crate::transformer::{self, BatchContext, Transformer};

/// The result of successfully applying a batch: the commit it produced and
/// the commit-message fragment contributed by each transformer, in order.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub commit: CommitHash,
    pub results: Vec<String>,
}

/// Owns the commit store and the engine-wide policy/config, and exposes the
/// single entry point callers use to mutate state: [`Engine::apply_batch`].
pub struct Engine<F: Filesystem + Snapshotable> {
    store: CommitStore<F>,
    config: EngineConfig,
    rbac: Option<RbacPolicy>,
    metrics: Arc<dyn MetricsSink>,
}

impl<F: Filesystem + Snapshotable> Engine<F> {
    pub fn new(fs: F, config: EngineConfig) -> Self {
        let branch = config.branch.clone();
        Engine {
            store: CommitStore::new(fs, branch),
            config,
            rbac: None,
            metrics: Arc::new(NoopSink),
        }
    }

    pub fn with_rbac(mut self, rbac: RbacPolicy) -> Self {
        self.rbac = Some(rbac);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &CommitStore<F> {
        &self.store
    }

    /// Apply every transformer in order against the live working tree. On
    /// the first error, the working tree is rolled back to its pre-batch
    /// state and no commit is written, so a failed batch leaves no trace on
    /// disk: earlier transformers in the same batch never get to keep a
    /// partial effect.
    pub async fn apply_batch(
        &self,
        clock: Arc<dyn Clock>,
        identity: Identity,
        transformers: &[Transformer],
    ) -> EngineResult<BatchOutcome> {
        let pre_batch = self.store.working_tree().snapshot();
        let mut ctx = BatchContext::new(self.store.working_tree().clone(), clock.clone(), identity.clone(), self.config.clone());
        if let Some(rbac) = &self.rbac {
            ctx = ctx.with_rbac(rbac.clone());
        }

        let mut results = Vec::with_capacity(transformers.len());
        for transformer in transformers {
            match transformer::apply(&ctx, transformer).await {
                Ok(message) => results.push(message),
                Err(e) => {
                    self.store.working_tree().restore(&pre_batch);
                    self.metrics.record(MetricEvent::BatchFailed { reason: e.to_string() });
                    return Err(e);
                }
            }
        }

        let metadata = CommitMetadata {
            message: results.join("\n"),
            author_name: identity.name,
            author_email: identity.email,
            committed_at_utc: clock.now(),
        };
        let commit = self.store.commit(metadata).await?;

        for transformer in transformers {
            if let Some((event_type, payload)) = event_for(transformer) {
                let borrowed: Vec<(&str, &str)> = payload.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                event::append_event(self.store.working_tree(), &commit, event_type, &borrowed).await?;
            }
        }

        self.metrics.record(MetricEvent::BatchApplied {
            transformer_count: transformers.len(),
        });
        tracing::info!(commit = %commit, transformer_count = transformers.len(), "applied batch");

        Ok(BatchOutcome { commit, results })
    }
}

/// The event log entry a transformer contributes, if any. `CreateEnvironment`,
/// `DeleteEnvFromApp` and `ReleaseTrain` produce no standalone event; a
/// release train's per-application deploys are not individually logged.
fn event_for(transformer: &Transformer) -> Option<(EventType, Vec<(String, String)>)> {
    match transformer {
        Transformer::CreateApplicationVersion(request) => Some((
            EventType::NewRelease,
            vec![("application".to_string(), request.app.clone())],
        )),
        Transformer::CreateUndeployApplicationVersion { app } => {
            Some((EventType::NewRelease, vec![("application".to_string(), app.clone())]))
        }
        Transformer::DeployApplicationVersion { env, app, version, .. } => Some((
            EventType::Deployment,
            vec![
                ("environment".to_string(), env.clone()),
                ("application".to_string(), app.clone()),
                ("version".to_string(), version.to_string()),
            ],
        )),
        Transformer::UndeployApplication { app } => Some((
            EventType::Deployment,
            vec![("application".to_string(), app.clone())],
        )),
        Transformer::CreateEnvironmentLock { env, lock_id, .. } => Some((
            EventType::LockCreated,
            vec![("environment".to_string(), env.clone()), ("lock_id".to_string(), lock_id.clone())],
        )),
        Transformer::DeleteEnvironmentLock { env, lock_id } => Some((
            EventType::LockDeleted,
            vec![("environment".to_string(), env.clone()), ("lock_id".to_string(), lock_id.clone())],
        )),
        Transformer::CreateEnvironmentApplicationLock { env, app, lock_id, .. } => Some((
            EventType::LockCreated,
            vec![
                ("environment".to_string(), env.clone()),
                ("application".to_string(), app.clone()),
                ("lock_id".to_string(), lock_id.clone()),
            ],
        )),
        Transformer::DeleteEnvironmentApplicationLock { env, app, lock_id } => Some((
            EventType::LockDeleted,
            vec![
                ("environment".to_string(), env.clone()),
                ("application".to_string(), app.clone()),
                ("lock_id".to_string(), lock_id.clone()),
            ],
        )),
        Transformer::CreateEnvironmentGroupLock { group, lock_id, .. } => Some((
            EventType::LockCreated,
            vec![("environment_group".to_string(), group.clone()), ("lock_id".to_string(), lock_id.clone())],
        )),
        Transformer::DeleteEnvironmentGroupLock { group, lock_id } => Some((
            EventType::LockDeleted,
            vec![("environment_group".to_string(), group.clone()), ("lock_id".to_string(), lock_id.clone())],
        )),
        Transformer::CreateEnvironment { .. } | Transformer::DeleteEnvFromApp { .. } | Transformer::ReleaseTrain { .. } => None,
    }
}
