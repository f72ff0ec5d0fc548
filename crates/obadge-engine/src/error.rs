//! # Engine Error Taxonomy
//!
//! Every failure a request can hit collapses into one of five kinds:
//!
//! | Kind | Meaning | Scope |
//! |---|---|---|
//! | `Validation` | malformed or incomplete request, bad configuration | this request |
//! | `NotFound` | wallet, credential or achievement absent | this request |
//! | `Conflict` | slug, achievement or merge collision | this request |
//! | `Signing` | key or canonicalization failure | this request |
//! | `Persistence` | reading or atomically replacing a file failed | this request |
//!
//! No kind leaves committed state inconsistent: a request either commits
//! its whole change set or none of it.

use thiserror::Error;

use obadge_bake::BakeError;
use obadge_core::{CanonicalizationError, StorageError, ValidationError};
use obadge_crypto::CryptoError;
use obadge_status::StatusError;
use obadge_vc::VcError;

use crate::config::ConfigError;

/// A rejected request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The request is malformed or incomplete.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced wallet, credential or achievement does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request collides with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Building or signing a document failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Reading or writing persisted state failed.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// The five error kinds, for exit-code mapping and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`EngineError::Validation`].
    Validation,
    /// See [`EngineError::NotFound`].
    NotFound,
    /// See [`EngineError::Conflict`].
    Conflict,
    /// See [`EngineError::Signing`].
    Signing,
    /// See [`EngineError::Persistence`].
    Persistence,
}

impl ErrorKind {
    /// Snake-case name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Signing => "signing",
            Self::Persistence => "persistence",
        }
    }
}

impl EngineError {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Whether the request itself was at fault (as opposed to the key or the
    /// filesystem).
    pub fn is_request_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict
        )
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<CanonicalizationError> for EngineError {
    fn from(e: CanonicalizationError) -> Self {
        Self::Signing(e.to_string())
    }
}

impl From<CryptoError> for EngineError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Storage(s) => s.into(),
            other => Self::Signing(other.to_string()),
        }
    }
}

impl From<VcError> for EngineError {
    fn from(e: VcError) -> Self {
        Self::Signing(e.to_string())
    }
}

impl From<StatusError> for EngineError {
    fn from(e: StatusError) -> Self {
        match e {
            StatusError::NotFound(what) => Self::NotFound(format!("status entry {what}")),
            StatusError::AlreadyAllocated(key) => {
                Self::Conflict(format!("credential {key} already holds a status index"))
            }
            StatusError::Storage(s) => s.into(),
            StatusError::Vc(v) => v.into(),
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl From<BakeError> for EngineError {
    fn from(e: BakeError) -> Self {
        Self::Persistence(format!("badge baking failed: {e}"))
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obadge_core::CredentialKey;

    #[test]
    fn status_errors_map_to_kinds() {
        let key = CredentialKey::parse("jane-doe/tsc").unwrap();
        assert_eq!(
            EngineError::from(StatusError::AlreadyAllocated(key)).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::from(StatusError::NotFound("x".into())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::from(StatusError::VersionConflict { expected: 1, found: 2 }).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn request_errors_are_distinguished() {
        assert!(EngineError::Conflict("slug".into()).is_request_error());
        assert!(!EngineError::Signing("key".into()).is_request_error());
        assert_eq!(
            EngineError::from(ValidationError::InvalidSlug("A B".into())).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn display_includes_kind() {
        let msg = EngineError::NotFound("wallet for jane@example.com".into()).to_string();
        assert_eq!(msg, "not found: wallet for jane@example.com");
    }
}
