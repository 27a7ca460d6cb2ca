//! End-to-end scenarios driven entirely through the public `Engine` API:
//! a release, a deploy, a lock blocking a second deploy, and a release
//! train promoting across an environment group.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kuberpult_core::clock::{Clock, FixedClock};
use kuberpult_core::config::EngineConfig;
use kuberpult_core::engine::Engine;
use kuberpult_core::errors::EngineError;
use kuberpult_core::fs::memory::MemoryFilesystem;
use kuberpult_core::identity::Identity;
use kuberpult_core::model::environment::{EnvironmentConfig, EnvironmentConfigUpstream};
use kuberpult_core::transformer::{CreateApplicationVersionRequest, LockBehaviour, Transformer};

fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
    ))
}

fn identity() -> Identity {
    Identity::new("alice", "alice@example.com")
}

fn manifests(env: &str, content: &str) -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert(env.to_string(), content.to_string());
    m
}

#[tokio::test]
async fn release_then_deploy_round_trip() {
    let engine = Engine::new(MemoryFilesystem::new(), EngineConfig::default());

    engine
        .apply_batch(
            clock(),
            identity(),
            &[Transformer::CreateEnvironment {
                env: "acceptance".to_string(),
                config: EnvironmentConfig::default(),
            }],
        )
        .await
        .unwrap();

    engine
        .apply_batch(
            clock(),
            identity(),
            &[Transformer::CreateApplicationVersion(CreateApplicationVersionRequest {
                app: "my-app".to_string(),
                manifests: manifests("acceptance", "kind: Deployment"),
                version: Some(1),
                source_commit_id: Some("a".repeat(40)),
                source_author: Some("alice".to_string()),
                source_message: Some("first release".to_string()),
                team: Some("team-sre".to_string()),
                display_version: Some("1.0.0".to_string()),
                write_commit_data: true,
            })],
        )
        .await
        .unwrap();

    let outcome = engine
        .apply_batch(
            clock(),
            identity(),
            &[Transformer::DeployApplicationVersion {
                env: "acceptance".to_string(),
                app: "my-app".to_string(),
                version: 1,
                lock_behaviour: LockBehaviour::Fail,
            }],
        )
        .await
        .unwrap();

    assert_eq!(outcome.results, vec!["Deployed version 1 of 'my-app' to 'acceptance'".to_string()]);

    let info = engine.store().commit_info(&outcome.commit.to_string()).await.unwrap();
    assert_eq!(info.touched_applications, Vec::<String>::new());
}

#[tokio::test]
async fn environment_lock_blocks_deploy_until_removed() {
    let engine = Engine::new(MemoryFilesystem::new(), EngineConfig::default());

    engine
        .apply_batch(
            clock(),
            identity(),
            &[
                Transformer::CreateEnvironment {
                    env: "production".to_string(),
                    config: EnvironmentConfig::default(),
                },
                Transformer::CreateApplicationVersion(CreateApplicationVersionRequest {
                    app: "my-app".to_string(),
                    manifests: manifests("production", "kind: Deployment"),
                    version: Some(1),
                    source_commit_id: None,
                    source_author: None,
                    source_message: None,
                    team: None,
                    display_version: None,
                    write_commit_data: false,
                }),
                Transformer::CreateEnvironmentLock {
                    env: "production".to_string(),
                    lock_id: "freeze".to_string(),
                    message: "holiday freeze".to_string(),
                },
            ],
        )
        .await
        .unwrap();

    let err = engine
        .apply_batch(
            clock(),
            identity(),
            &[Transformer::DeployApplicationVersion {
                env: "production".to_string(),
                app: "my-app".to_string(),
                version: 1,
                lock_behaviour: LockBehaviour::Fail,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Locked { .. }));

    engine
        .apply_batch(
            clock(),
            identity(),
            &[
                Transformer::DeleteEnvironmentLock {
                    env: "production".to_string(),
                    lock_id: "freeze".to_string(),
                },
                Transformer::DeployApplicationVersion {
                    env: "production".to_string(),
                    app: "my-app".to_string(),
                    version: 1,
                    lock_behaviour: LockBehaviour::Fail,
                },
            ],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn release_train_promotes_group_members_from_upstream_environment() {
    let engine = Engine::new(MemoryFilesystem::new(), EngineConfig::default());

    engine
        .apply_batch(
            clock(),
            identity(),
            &[
                Transformer::CreateEnvironment {
                    env: "staging".to_string(),
                    config: EnvironmentConfig::default(),
                },
                Transformer::CreateEnvironment {
                    env: "prod-eu".to_string(),
                    config: EnvironmentConfig {
                        environment_group: Some("prod".to_string()),
                        upstream: Some(EnvironmentConfigUpstream {
                            latest: false,
                            environment: Some("staging".to_string()),
                        }),
                        ..Default::default()
                    },
                },
                Transformer::CreateEnvironment {
                    env: "prod-us".to_string(),
                    config: EnvironmentConfig {
                        environment_group: Some("prod".to_string()),
                        upstream: Some(EnvironmentConfigUpstream {
                            latest: false,
                            environment: Some("staging".to_string()),
                        }),
                        ..Default::default()
                    },
                },
                Transformer::CreateApplicationVersion(CreateApplicationVersionRequest {
                    app: "my-app".to_string(),
                    manifests: manifests("staging", "kind: Deployment"),
                    version: Some(1),
                    source_commit_id: None,
                    source_author: None,
                    source_message: None,
                    team: None,
                    display_version: None,
                    write_commit_data: false,
                }),
                Transformer::DeployApplicationVersion {
                    env: "staging".to_string(),
                    app: "my-app".to_string(),
                    version: 1,
                    lock_behaviour: LockBehaviour::Fail,
                },
            ],
        )
        .await
        .unwrap();

    let outcome = engine
        .apply_batch(
            clock(),
            identity(),
            &[Transformer::ReleaseTrain {
                target: "prod".to_string(),
                team: None,
            }],
        )
        .await
        .unwrap();

    assert!(outcome.results[0].contains("'my-app' was deployed to 'prod-eu'"));
    assert!(outcome.results[0].contains("'my-app' was deployed to 'prod-us'"));
}
