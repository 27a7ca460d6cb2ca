//! Typed engine configuration, loaded from an in-process map (tests,
//! bootstrap) or from environment-style key/value pairs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Engine-wide configuration, covering bootstrap mode, release retention,
/// and the RBAC/commit-data feature gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// In bootstrap mode, `CreateEnvironment` rejects a non-empty config
    /// argument; real config must come from `bootstrap_environments`.
    pub bootstrap_mode: bool,
    /// `K`: the number of releases retained per application on cleanup.
    pub release_versions_limit: u32,
    /// Gate for the commit-info read path (`KUBERPULT_GIT_WRITE_COMMIT_DATA`).
    pub write_commit_data: bool,
    /// Gate for the RBAC policy (`KUBERPULT_DEX_ENABLED`).
    pub dex_enabled: bool,
    /// The single branch the engine writes to.
    pub branch: String,
    /// In bootstrap mode, the externally-supplied environment configs that
    /// `CreateEnvironment` falls back to when its own `config` argument is
    /// empty.
    #[serde(default)]
    pub bootstrap_environments: HashMap<String, crate::model::environment::EnvironmentConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            bootstrap_mode: false,
            release_versions_limit: 20,
            write_commit_data: false,
            dex_enabled: false,
            branch: "master".to_string(),
            bootstrap_environments: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Build a config from an environment-variable-style map, reading
    /// `KUBERPULT_DEX_ENABLED` and `KUBERPULT_GIT_WRITE_COMMIT_DATA`.
    pub fn from_env_map(env: &HashMap<String, String>) -> Self {
        let mut cfg = EngineConfig::default();
        if let Some(v) = env.get("KUBERPULT_DEX_ENABLED") {
            cfg.dex_enabled = parse_bool(v);
        }
        if let Some(v) = env.get("KUBERPULT_GIT_WRITE_COMMIT_DATA") {
            cfg.write_commit_data = parse_bool(v);
        }
        cfg
    }

    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
