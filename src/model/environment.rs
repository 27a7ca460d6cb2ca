//! Environment configuration: `environments/<env>/config.yaml`.

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};
use crate::fs::Filesystem;

/// Either `latest = true` or `environment = <name>`, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnvironmentConfigUpstream {
    #[serde(default)]
    pub latest: bool,
    #[serde(default)]
    pub environment: Option<String>,
}

impl EnvironmentConfigUpstream {
    /// Classification used by the release train to decide which of the
    /// four upstream states it is looking at.
    pub fn kind(&self) -> UpstreamKind {
        match (self.latest, &self.environment) {
            (true, None) => UpstreamKind::Latest,
            (false, Some(env)) if !env.is_empty() => UpstreamKind::Environment(env.clone()),
            (true, Some(env)) if !env.is_empty() => UpstreamKind::Both,
            _ => UpstreamKind::Neither,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamKind {
    Latest,
    Environment(String),
    Neither,
    Both,
}

/// ArgoCD-specific configuration for one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ArgoCdConfig {
    pub destination_name: String,
    pub destination_namespace: String,
    pub repo_url: String,
    #[serde(default)]
    pub sync_windows: Vec<SyncWindow>,
    #[serde(default)]
    pub ignore_differences: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub cluster_resource_whitelist: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub application_annotations: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub kind: String,
    pub schedule: String,
    pub duration: String,
}

/// One environment's desired-state config, written once at creation time and
/// read by every deployment / release-train operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub upstream: Option<EnvironmentConfigUpstream>,
    #[serde(default)]
    pub environment_group: Option<String>,
    #[serde(default)]
    pub argo_cd: Option<ArgoCdConfig>,
}

impl EnvironmentConfig {
    pub fn is_empty(&self) -> bool {
        self.upstream.is_none() && self.environment_group.is_none() && self.argo_cd.is_none()
    }
}

fn config_path<F: Filesystem>(fs: &F, env: &str) -> String {
    fs.join(&["environments", env, "config.yaml"])
}

pub async fn write_environment_config<F: Filesystem>(
    fs: &F,
    env: &str,
    config: &EnvironmentConfig,
) -> EngineResult<()> {
    let yaml = serde_yaml::to_string(config)
        .map_err(|e| EngineError::internal(format!("failed to serialize environment config: {e}")))?;
    fs.write(&config_path(fs, env), yaml.as_bytes())
        .await
        .map_err(|e| EngineError::io(config_path(fs, env), e))
}

pub async fn read_environment_config<F: Filesystem>(fs: &F, env: &str) -> EngineResult<EnvironmentConfig> {
    let path = config_path(fs, env);
    match fs.read(&path).await {
        Ok(bytes) => serde_yaml::from_slice(&bytes)
            .map_err(|e| EngineError::internal(format!("malformed environment config at {path}: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(EngineError::not_found(format!("environment \"{env}\" does not exist")))
        }
        Err(e) => Err(EngineError::io(path, e)),
    }
}

pub async fn environment_exists<F: Filesystem>(fs: &F, env: &str) -> bool {
    fs.stat(&fs.join(&["environments", env])).await.is_ok()
}

/// List every environment name, sorted, regardless of group membership.
pub async fn list_environments<F: Filesystem>(fs: &F) -> EngineResult<Vec<String>> {
    crate::fs::list_names_or_empty(fs, "environments")
        .await
        .map_err(|e| EngineError::io("environments", e))
}

/// Environments whose `environmentGroup` equals `group` exactly. There is
/// no implicit self-group fallback when the group is unset.
pub async fn environments_in_group<F: Filesystem>(fs: &F, group: &str) -> EngineResult<Vec<String>> {
    let all = list_environments(fs).await?;
    let mut members = Vec::new();
    for env in all {
        let cfg = read_environment_config(fs, &env).await?;
        if cfg.environment_group.as_deref() == Some(group) {
            members.push(env);
        }
    }
    members.sort();
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::MemoryFilesystem;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let fs = MemoryFilesystem::new();
        let cfg = EnvironmentConfig {
            upstream: Some(EnvironmentConfigUpstream {
                latest: true,
                environment: None,
            }),
            environment_group: Some("prod".to_string()),
            argo_cd: None,
        };
        write_environment_config(&fs, "acceptance", &cfg).await.unwrap();
        let read_back = read_environment_config(&fs, "acceptance").await.unwrap();
        assert_eq!(read_back, cfg);
    }

    #[tokio::test]
    async fn upstream_kind_classifies_all_four_states() {
        assert_eq!(
            EnvironmentConfigUpstream {
                latest: true,
                environment: None
            }
            .kind(),
            UpstreamKind::Latest
        );
        assert_eq!(
            EnvironmentConfigUpstream {
                latest: false,
                environment: Some("dev".into())
            }
            .kind(),
            UpstreamKind::Environment("dev".into())
        );
        assert_eq!(
            EnvironmentConfigUpstream {
                latest: false,
                environment: None
            }
            .kind(),
            UpstreamKind::Neither
        );
        assert_eq!(
            EnvironmentConfigUpstream {
                latest: true,
                environment: Some("dev".into())
            }
            .kind(),
            UpstreamKind::Both
        );
    }

    #[tokio::test]
    async fn group_membership_requires_exact_match() {
        let fs = MemoryFilesystem::new();
        write_environment_config(
            &fs,
            "prod-ca",
            &EnvironmentConfig {
                environment_group: Some("prod".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        write_environment_config(
            &fs,
            "prod",
            &EnvironmentConfig::default(),
        )
        .await
        .unwrap();
        let members = environments_in_group(&fs, "prod").await.unwrap();
        assert_eq!(members, vec!["prod-ca".to_string()]);
    }
}
