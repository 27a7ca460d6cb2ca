use crate::errors::EngineResult;
use crate::fs::Filesystem;
use crate::model::{environment, lock};

use super::BatchContext;

fn new_lock<F: Filesystem>(ctx: &BatchContext<F>, lock_id: &str, message: &str) -> lock::Lock {
    lock::Lock {
        lock_id: lock_id.to_string(),
        message: message.to_string(),
        created_by_name: ctx.identity.name.clone(),
        created_by_email: ctx.identity.email.clone(),
        created_at_utc: ctx.clock.now(),
    }
}

pub async fn create_environment_lock<F: Filesystem>(
    ctx: &BatchContext<F>,
    env: &str,
    lock_id: &str,
    message: &str,
) -> EngineResult<String> {
    lock::create_environment_lock(&ctx.fs, env, &new_lock(ctx, lock_id, message)).await?;
    Ok(format!("Created lock '{lock_id}' on environment '{env}'"))
}

pub async fn delete_environment_lock<F: Filesystem>(
    ctx: &BatchContext<F>,
    env: &str,
    lock_id: &str,
) -> EngineResult<String> {
    lock::delete_environment_lock(&ctx.fs, env, lock_id).await?;
    Ok(format!("Deleted lock '{lock_id}' on environment '{env}'"))
}

pub async fn create_environment_application_lock<F: Filesystem>(
    ctx: &BatchContext<F>,
    env: &str,
    app: &str,
    lock_id: &str,
    message: &str,
) -> EngineResult<String> {
    lock::create_environment_application_lock(&ctx.fs, env, app, &new_lock(ctx, lock_id, message)).await?;
    Ok(format!(
        "Created lock '{lock_id}' on application '{app}' in environment '{env}'"
    ))
}

pub async fn delete_environment_application_lock<F: Filesystem>(
    ctx: &BatchContext<F>,
    env: &str,
    app: &str,
    lock_id: &str,
) -> EngineResult<String> {
    lock::delete_environment_application_lock(&ctx.fs, env, app, lock_id).await?;
    Ok(format!(
        "Deleted lock '{lock_id}' on application '{app}' in environment '{env}'"
    ))
}

/// Resolve `group` to its member environments: those whose
/// `environmentGroup` equals `group`, or, if none declare the group, the
/// single environment named exactly `group`.
async fn group_members<F: Filesystem>(fs: &F, group: &str) -> EngineResult<Vec<String>> {
    let members = environment::environments_in_group(fs, group).await?;
    if !members.is_empty() {
        return Ok(members);
    }
    if environment::environment_exists(fs, group).await {
        return Ok(vec![group.to_string()]);
    }
    Ok(Vec::new())
}

pub async fn create_environment_group_lock<F: Filesystem>(
    ctx: &BatchContext<F>,
    group: &str,
    lock_id: &str,
    message: &str,
) -> EngineResult<String> {
    let members = group_members(&ctx.fs, group).await?;
    if members.is_empty() {
        return Err(crate::errors::EngineError::not_found(
            "no environment found with given group",
        ));
    }
    for env in &members {
        ctx.authorize_in_group("EnvironmentLock", "Create", group, env)?;
        lock::create_environment_lock(&ctx.fs, env, &new_lock(ctx, lock_id, message)).await?;
    }
    Ok(format!(
        "Created lock '{lock_id}' on environment group '{group}' ({})",
        members.join(", ")
    ))
}

pub async fn delete_environment_group_lock<F: Filesystem>(
    ctx: &BatchContext<F>,
    group: &str,
    lock_id: &str,
) -> EngineResult<String> {
    let members = group_members(&ctx.fs, group).await?;
    if members.is_empty() {
        return Err(crate::errors::EngineError::not_found(
            "no environment found with given group",
        ));
    }
    for env in &members {
        ctx.authorize_in_group("EnvironmentLock", "Delete", group, env)?;
        lock::delete_environment_lock(&ctx.fs, env, lock_id).await?;
    }
    Ok(format!(
        "Deleted lock '{lock_id}' on environment group '{group}' ({})",
        members.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::EngineConfig;
    use crate::fs::memory::MemoryFilesystem;
    use crate::identity::Identity;
    use crate::model::environment::EnvironmentConfig;
    use std::sync::Arc;

    fn ctx() -> BatchContext<MemoryFilesystem> {
        BatchContext::new(
            MemoryFilesystem::new(),
            Arc::new(SystemClock),
            Identity::system(),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn group_lock_fans_out_to_every_member_and_deletes_symmetrically() {
        let ctx = ctx();
        environment::write_environment_config(
            &ctx.fs,
            "prod-eu",
            &EnvironmentConfig {
                environment_group: Some("prod".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        environment::write_environment_config(
            &ctx.fs,
            "prod-us",
            &EnvironmentConfig {
                environment_group: Some("prod".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        create_environment_group_lock(&ctx, "prod", "l1", "rollout freeze").await.unwrap();
        assert_eq!(lock::environment_locks(&ctx.fs, "prod-eu").await.unwrap().len(), 1);
        assert_eq!(lock::environment_locks(&ctx.fs, "prod-us").await.unwrap().len(), 1);

        delete_environment_group_lock(&ctx, "prod", "l1").await.unwrap();
        assert!(lock::environment_locks(&ctx.fs, "prod-eu").await.unwrap().is_empty());
        assert!(lock::environment_locks(&ctx.fs, "prod-us").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_group_fails_the_batch() {
        let ctx = ctx();
        let err = create_environment_group_lock(&ctx, "nonexistent", "l1", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::errors::EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn ungrouped_environment_falls_back_to_self_named_group() {
        let ctx = ctx();
        environment::write_environment_config(&ctx.fs, "staging", &EnvironmentConfig::default())
            .await
            .unwrap();
        create_environment_group_lock(&ctx, "staging", "l1", "x").await.unwrap();
        assert_eq!(lock::environment_locks(&ctx.fs, "staging").await.unwrap().len(), 1);
    }
}
