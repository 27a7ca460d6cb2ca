//! Error types for the Kuberpult core engine.
//!
//! This module defines a unified error enumeration used across the filesystem
//! abstraction, the data model, the transformer pipeline, and the policy
//! engine. It integrates with `thiserror` to provide rich `Display`
//! implementations and error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - `Locked` and `AlreadyExistsDifferent` carry structured fields instead of
//!   pre-formatted strings, since call sites need to inspect them rather than
//!   re-parse a `Display` string.

use std::collections::BTreeMap;

use thiserror::Error;

/// A lock id paired with the human-readable message it was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub lock_id: String,
    pub message: String,
}

/// Unified error enumeration for the Kuberpult core engine.
///
/// - Used across the FS abstraction, the data model, the transformer
///   pipeline, and the policy engine.
/// - Implements `std::error::Error` via `thiserror`.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Structural violation: bad SHA-1, malformed policy line, missing required field.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown revision, unknown commit prefix, unknown environment group.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bootstrap-mode config write, or deletion of a lock that does not exist.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// RBAC policy check failed. Message names the (user, role, action, env) tuple.
    #[error(
        "permission denied: user \"{user}\" with role \"{role}\" is not allowed to {action} on \"{env}\""
    )]
    PermissionDenied {
        user: String,
        role: String,
        action: String,
        env: String,
    },

    /// One or more locks block a deploy with `LockBehaviour::Fail`.
    #[error("locked: {} environment lock(s), {} application lock(s)", env_locks.len(), app_locks.len())]
    Locked {
        env_locks: BTreeMap<String, LockInfo>,
        app_locks: BTreeMap<String, LockInfo>,
    },

    /// `CreateApplicationVersion` repeated with identical content.
    #[error("already_exists_same:{{}}")]
    AlreadyExistsSame,

    /// `CreateApplicationVersion` repeated with different content.
    #[error("already_exists_different:{{first_differing_field:{first_differing_field} diff:{diff:?}}}")]
    AlreadyExistsDifferent {
        first_differing_field: String,
        diff: String,
    },

    /// `CreateApplicationVersion` for a version older than `latest - K`.
    #[error("too_old: version {version} is older than the retained window (latest {latest}, kept {kept})")]
    TooOld { version: u64, latest: u64, kept: u32 },

    /// Anything else, including I/O errors from the filesystem backend.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error from the underlying filesystem backend, wrapped with the
    /// offending path and the underlying cause.
    #[error("io error at path \"{path}\": {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        EngineError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        EngineError::FailedPrecondition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
