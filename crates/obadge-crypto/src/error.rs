//! # Cryptographic Error Types
//!
//! Structured errors for key handling, signing and verification.

use std::path::PathBuf;

use obadge_core::StorageError;
use thiserror::Error;

/// Errors from cryptographic operations in `obadge-crypto`.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("Ed25519 verification failed: {0}")]
    VerificationFailed(String),

    /// Signature bytes have the wrong length.
    #[error("invalid Ed25519 signature length: expected 64 bytes, got {0}")]
    InvalidSignatureLength(usize),

    /// Public key bytes are not a valid Ed25519 point or have the wrong header.
    #[error("invalid Ed25519 public key: {0}")]
    InvalidPublicKey(String),

    /// Secret key bytes have the wrong length or header.
    #[error("invalid Ed25519 secret key: {0}")]
    InvalidSecretKey(String),

    /// A multibase string is not `z`-prefixed base58btc.
    #[error("multibase decode error: {0}")]
    Multibase(String),

    /// A key document on disk is missing or malformed.
    #[error("key file {}: {reason}", path.display())]
    KeyFile {
        /// The key document path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Reading or writing key material failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Canonicalization of a signing input failed.
    #[error(transparent)]
    Canonicalization(#[from] obadge_core::CanonicalizationError),
}
