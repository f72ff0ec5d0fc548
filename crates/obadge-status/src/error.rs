//! # Status List Error Types

use obadge_core::{CredentialKey, StorageError};
use thiserror::Error;

/// Errors from the status list manager.
#[derive(Error, Debug)]
pub enum StatusError {
    /// A bit index lies beyond the current list length.
    #[error("status index {index} out of range for a list of {len_bits} bits")]
    IndexOutOfRange {
        /// The requested index.
        index: u64,
        /// Current list length in bits.
        len_bits: u64,
    },

    /// The encoded list could not be decoded.
    #[error("encoded status list is invalid: {0}")]
    Decoding(String),

    /// Compression of the list failed.
    #[error("status list encoding failed: {0}")]
    Encoding(#[from] std::io::Error),

    /// The credential already holds a status index.
    #[error("credential {0} already has a status index")]
    AlreadyAllocated(CredentialKey),

    /// No live status entry exists for the credential or index.
    #[error("no status entry for {0}")]
    NotFound(String),

    /// The registry on disk changed since it was loaded.
    #[error("status registry changed concurrently: loaded version {expected}, found {found} on disk")]
    VersionConflict {
        /// The version this process loaded.
        expected: u64,
        /// The version now on disk.
        found: u64,
    },

    /// Reading or writing the registry or list failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Building or signing the status list credential failed.
    #[error(transparent)]
    Vc(#[from] obadge_vc::VcError),
}
