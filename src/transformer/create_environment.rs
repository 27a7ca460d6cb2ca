use crate::errors::{EngineError, EngineResult};
use crate::fs::Filesystem;
use crate::model::environment::{self, EnvironmentConfig};

use super::BatchContext;

/// Write `env`'s config. In bootstrap mode a non-empty `config` argument is
/// rejected; the environment's real config must instead come from
/// `BatchContext::config.bootstrap_environments`.
pub async fn apply<F: Filesystem>(
    ctx: &BatchContext<F>,
    env: &str,
    config: &EnvironmentConfig,
) -> EngineResult<String> {
    let _span = tracing::info_span!("create_environment", env = %env).entered();

    let resolved = if ctx.config.bootstrap_mode {
        if !config.is_empty() {
            return Err(EngineError::failed_precondition(
                "bootstrap mode: CreateEnvironment does not accept a config argument; configure environments via the bootstrap map",
            ));
        }
        ctx.config
            .bootstrap_environments
            .get(env)
            .cloned()
            .unwrap_or_default()
    } else {
        config.clone()
    };

    environment::write_environment_config(&ctx.fs, env, &resolved).await?;
    Ok(format!("Created environment '{env}'"))
}
