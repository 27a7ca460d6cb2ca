//! Pure renderer for the ArgoCD `AppProject` and `Application` manifests the
//! GitOps agent reconciles against a cluster. This module performs no I/O:
//! callers supply an environment's [`ArgoCdConfig`] and a release's manifest
//! content, already read via the data-model accessors.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::environment::ArgoCdConfig;

#[derive(Debug, Clone, Serialize)]
pub struct AppProject {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ProjectMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectMetadata {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Application {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ApplicationMetadata,
    pub spec: ApplicationSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationMetadata {
    pub name: String,
    pub annotations: BTreeMap<String, String>,
    pub finalizers: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSpec {
    pub destination: Destination,
    pub project: String,
    pub source: Source,
    #[serde(rename = "syncPolicy")]
    pub sync_policy: SyncPolicy,
    #[serde(rename = "syncWindows", skip_serializing_if = "Vec::is_empty")]
    pub sync_windows: Vec<serde_yaml::Value>,
    #[serde(rename = "ignoreDifferences", skip_serializing_if = "Vec::is_empty")]
    pub ignore_differences: Vec<serde_yaml::Value>,
    #[serde(rename = "clusterResourceWhitelist", skip_serializing_if = "Vec::is_empty")]
    pub cluster_resource_whitelist: Vec<serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Destination {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub path: String,
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    #[serde(rename = "targetRevision")]
    pub target_revision: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncPolicy {
    pub automated: SyncPolicyAutomated,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncPolicyAutomated {
    #[serde(rename = "allowEmpty")]
    pub allow_empty: bool,
    pub prune: bool,
    #[serde(rename = "selfHeal")]
    pub self_heal: bool,
}

/// Render the `AppProject` document for one environment. Independent of any
/// particular application.
pub fn render_app_project(env: &str) -> AppProject {
    AppProject {
        api_version: "argoproj.io/v1alpha1".to_string(),
        kind: "AppProject".to_string(),
        metadata: ProjectMetadata {
            name: env.to_string(),
        },
    }
}

/// Render the `Application` document for one (environment, application)
/// pair, pointing the source at the manifest path for `version` in the
/// shared repo layout.
pub fn render_application(
    env: &str,
    app: &str,
    version: u64,
    team: Option<&str>,
    config: &ArgoCdConfig,
) -> Application {
    let mut annotations = BTreeMap::new();
    annotations.insert(
        "argocd.argoproj.io/manifest-generate-paths".to_string(),
        ".".to_string(),
    );
    annotations.insert(
        "com.freiheit.kuberpult/application".to_string(),
        app.to_string(),
    );
    annotations.insert(
        "com.freiheit.kuberpult/environment".to_string(),
        env.to_string(),
    );
    if let Some(team) = team {
        annotations.insert("com.freiheit.kuberpult/team".to_string(), team.to_string());
    }
    for (key, value) in &config.application_annotations {
        annotations.insert(key.clone(), value.clone());
    }

    let sync_windows = config
        .sync_windows
        .iter()
        .map(|w| {
            serde_yaml::to_value(w).expect("SyncWindow always serializes")
        })
        .collect();

    Application {
        api_version: "argoproj.io/v1alpha1".to_string(),
        kind: "Application".to_string(),
        metadata: ApplicationMetadata {
            name: format!("{env}-{app}"),
            annotations,
            finalizers: vec!["resources-finalizer.argocd.argoproj.io".to_string()],
            labels: BTreeMap::new(),
        },
        spec: ApplicationSpec {
            destination: Destination {
                name: config.destination_name.clone(),
                namespace: config.destination_namespace.clone(),
            },
            project: env.to_string(),
            source: Source {
                path: format!("applications/{app}/releases/{version}/environments/{env}"),
                repo_url: config.repo_url.clone(),
                target_revision: "master".to_string(),
            },
            sync_policy: SyncPolicy {
                automated: SyncPolicyAutomated {
                    allow_empty: true,
                    prune: true,
                    self_heal: true,
                },
            },
            sync_windows,
            ignore_differences: config.ignore_differences.clone(),
            cluster_resource_whitelist: config.cluster_resource_whitelist.clone(),
        },
    }
}
