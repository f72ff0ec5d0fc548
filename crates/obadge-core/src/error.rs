//! # Error Types
//!
//! Structured errors shared by every crate in the workspace. All errors use
//! `thiserror`; there is no `Box<dyn Error>` and no `.unwrap()` outside tests.
//!
//! - [`CanonicalizationError`] when a value cannot be turned into JCS bytes.
//! - [`ValidationError`] when an identifier or timestamp fails its format check.
//! - [`StorageError`] when an atomic write, read or lock acquisition fails.

use std::path::PathBuf;

use thiserror::Error;

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Validation errors for identifier newtypes and timestamps.
///
/// Each variant carries the rejected input so that a request author can see
/// exactly which field was wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Email address is empty or lacks a local part and a domain.
    #[error("invalid email address: \"{0}\"")]
    InvalidEmail(String),

    /// Slug does not match `^[a-z0-9]+(-[a-z0-9]+)*$` or is too long.
    #[error("invalid wallet slug: \"{0}\" (expected lowercase words joined by single hyphens)")]
    InvalidSlug(String),

    /// Achievement identifier is empty or contains a path separator.
    #[error("invalid achievement id: \"{0}\"")]
    InvalidAchievementId(String),

    /// Composite credential key is not `wallet_slug/achievement_id`.
    #[error("invalid credential id: \"{0}\" (expected wallet-slug/achievement-id)")]
    InvalidCredentialKey(String),

    /// Timestamp string is not valid RFC 3339.
    #[error("invalid timestamp: \"{value}\" ({reason})")]
    InvalidTimestamp {
        /// The string that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors from the file-backed persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A persisted JSON document could not be parsed or produced.
    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        /// The offending file.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The workspace lock is held by another writer.
    #[error("workspace lock {} still held after {waited_ms} ms (holder: {holder})", path.display())]
    LockTimeout {
        /// Path of the lock file.
        path: PathBuf,
        /// How long acquisition was attempted.
        waited_ms: u64,
        /// Contents of the lock file, identifying the holder.
        holder: String,
    },
}

impl StorageError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a JSON error with the path it occurred on.
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_input() {
        let err = ValidationError::InvalidSlug("Bad Slug".into());
        assert!(err.to_string().contains("Bad Slug"));
    }

    #[test]
    fn storage_error_mentions_path() {
        let err = StorageError::io(
            "/tmp/wallet-registry.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("wallet-registry.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn lock_timeout_mentions_holder() {
        let err = StorageError::LockTimeout {
            path: PathBuf::from(".obadge.lock"),
            waited_ms: 250,
            holder: "pid 42".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("250 ms"));
        assert!(msg.contains("pid 42"));
    }

    #[test]
    fn float_rejected_display() {
        let err = CanonicalizationError::FloatRejected(1.5);
        assert!(err.to_string().contains("1.5"));
    }
}
