//! RBAC policy engine: a CSV table of six-field permission lines gating
//! every mutating Transformer, checked against the Dex-issued role on the
//! calling identity.
//!
//! A policy line has the form `p,<role>,<application>,<action>,<envSpec>,allow`,
//! where `application` is one of a closed set of permission subjects,
//! `action` is `Create`, `Delete`, or `*`, and `envSpec` is `<group>:<env>`
//! or `<env>`. The policy itself is the set of raw line strings; an access
//! check constructs the expected line from the caller's role and the
//! requested tuple and tests membership, rather than matching fields
//! structurally.

use std::collections::HashSet;

use thiserror::Error;

use crate::errors::{EngineError, EngineResult};

/// The closed set of permission subjects a policy line may name.
pub const ALLOWED_APPLICATIONS: &[&str] = &[
    "EnvironmentLock",
    "EnvironmentApplicationLock",
    "Deploy",
    "Undeploy",
    "EnvironmentFromApplication",
];

pub const ALLOWED_ACTIONS: &[&str] = &["Create", "Delete"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyParseError {
    #[error("6 fields are expected but only {0} were specified")]
    WrongFieldCount(usize),
    #[error("invalid application {0}")]
    InvalidApplication(String),
    #[error("invalid action {0}")]
    InvalidAction(String),
    #[error("invalid environment {0}")]
    InvalidEnvironment(String),
}

/// A single parsed permission line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    pub role: String,
    pub application: String,
    pub action: String,
    pub env_spec: String,
}

/// True iff `name` is a non-empty string of lowercase ASCII letters,
/// digits, and hyphens.
fn is_valid_environment_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn validate_application(app: &str) -> Result<(), PolicyParseError> {
    if ALLOWED_APPLICATIONS.contains(&app) {
        Ok(())
    } else {
        Err(PolicyParseError::InvalidApplication(app.to_string()))
    }
}

fn validate_action(action: &str) -> Result<(), PolicyParseError> {
    if action == "*" || ALLOWED_ACTIONS.contains(&action) {
        Ok(())
    } else {
        Err(PolicyParseError::InvalidAction(action.to_string()))
    }
}

fn validate_env_spec(env_spec: &str) -> Result<(), PolicyParseError> {
    let parts: Vec<&str> = env_spec.split(':').collect();
    match parts.as_slice() {
        [env] if is_valid_environment_name(env) => Ok(()),
        [group, env] if is_valid_environment_name(group) && is_valid_environment_name(env) => Ok(()),
        _ => Err(PolicyParseError::InvalidEnvironment(env_spec.to_string())),
    }
}

/// Parse and validate one policy line of the form
/// `p,<role>,<application>,<action>,<envSpec>,allow`.
pub fn parse_policy_line(line: &str) -> Result<Permission, PolicyParseError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 6 {
        return Err(PolicyParseError::WrongFieldCount(fields.len()));
    }
    let [_, role, application, action, env_spec, _allow] = [
        fields[0], fields[1], fields[2], fields[3], fields[4], fields[5],
    ];
    validate_application(application)?;
    validate_action(action)?;
    validate_env_spec(env_spec)?;
    Ok(Permission {
        role: role.to_string(),
        application: application.to_string(),
        action: action.to_string(),
        env_spec: env_spec.to_string(),
    })
}

/// The set of raw policy lines currently granted. Lookup is by exact line
/// membership, not by structural field matching.
#[derive(Debug, Clone, Default)]
pub struct RbacPolicy {
    lines: HashSet<String>,
}

impl RbacPolicy {
    /// Parse a CSV policy document, one permission line per row. Whitespace
    /// is stripped from each line before parsing, matching how the policy
    /// file is authored by hand.
    pub fn from_csv(csv: &str) -> EngineResult<Self> {
        let mut lines = HashSet::new();
        for raw_line in csv.lines() {
            let line: String = raw_line.chars().filter(|c| !c.is_whitespace()).collect();
            if line.is_empty() {
                continue;
            }
            parse_policy_line(&line).map_err(|e| EngineError::invalid_argument(e.to_string()))?;
            lines.insert(line);
        }
        if lines.is_empty() {
            return Err(EngineError::failed_precondition(
                "dex.policy.error: a non-empty RBAC policy is required when Dex is enabled",
            ));
        }
        Ok(RbacPolicy { lines })
    }

    /// True iff the given role is granted `action` on `application` for the
    /// given `envSpec`.
    pub fn allows(&self, role: &str, application: &str, action: &str, env_spec: &str) -> bool {
        let wanted = format!("p,{role},{application},{action},{env_spec},allow");
        self.lines.contains(&wanted)
    }
}

/// Check whether `role` may perform `action` on `application` for
/// `group:env`. When `rbac` is `None` (Dex disabled), every check passes.
pub fn check_permission(
    rbac: Option<&RbacPolicy>,
    role: &str,
    application: &str,
    action: &str,
    group: &str,
    env: &str,
) -> EngineResult<()> {
    let Some(policy) = rbac else {
        return Ok(());
    };
    let env_spec = format!("{group}:{env}");
    if policy.allows(role, application, action, &env_spec) {
        return Ok(());
    }
    Err(EngineError::PermissionDenied {
        user: role.to_string(),
        role: role.to_string(),
        action: format!("{action} {application}"),
        env: env_spec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_line() {
        let permission = parse_policy_line("p,Developer,EnvironmentLock,Create,production:acceptance,allow").unwrap();
        assert_eq!(permission.role, "Developer");
        assert_eq!(permission.application, "EnvironmentLock");
        assert_eq!(permission.action, "Create");
        assert_eq!(permission.env_spec, "production:acceptance");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(
            parse_policy_line("p,Developer,EnvironmentLock,Create,allow"),
            Err(PolicyParseError::WrongFieldCount(5))
        );
    }

    #[test]
    fn rejects_unknown_application() {
        assert!(matches!(
            parse_policy_line("p,Developer,NotAThing,Create,acceptance,allow"),
            Err(PolicyParseError::InvalidApplication(_))
        ));
    }

    #[test]
    fn accepts_wildcard_action() {
        assert!(parse_policy_line("p,Developer,Deploy,*,acceptance,allow").is_ok());
    }

    #[test]
    fn empty_policy_is_rejected_when_dex_enabled() {
        let err = RbacPolicy::from_csv("").unwrap_err();
        assert!(matches!(err, EngineError::FailedPrecondition(_)));
    }

    #[test]
    fn check_permission_passes_through_when_rbac_disabled() {
        assert!(check_permission(None, "Developer", "Deploy", "Create", "prod", "acceptance").is_ok());
    }

    #[test]
    fn check_permission_denies_when_line_absent() {
        let policy = RbacPolicy::from_csv("p,Developer,Deploy,Create,prod:acceptance,allow").unwrap();
        let err = check_permission(Some(&policy), "Developer", "Undeploy", "Create", "prod", "acceptance")
            .unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied { .. }));
    }

    #[test]
    fn check_permission_allows_matching_line() {
        let policy = RbacPolicy::from_csv("p,Developer,Deploy,Create,prod:acceptance,allow").unwrap();
        assert!(check_permission(Some(&policy), "Developer", "Deploy", "Create", "prod", "acceptance").is_ok());
    }
}
