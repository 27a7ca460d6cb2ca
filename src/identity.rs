//! Identity context injected into every batch so tests can pin author
//! identity deterministically. The Dex-based identity provider that
//! produces this value is out of scope; the engine only consumes the
//! resolved identity.

use serde::{Deserialize, Serialize};

/// The caller performing the current batch of transformers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
    /// The RBAC role, present only when Dex/RBAC is enabled.
    pub role: Option<String>,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Identity {
            name: name.into(),
            email: email.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Used by release-train and auto-deploy internal invocations that are
    /// not attributable to a single human caller.
    pub fn system() -> Self {
        Identity {
            name: "kuberpult".to_string(),
            email: "kuberpult@localhost".to_string(),
            role: None,
        }
    }
}
