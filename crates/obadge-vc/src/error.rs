//! # Credential Error Types

use thiserror::Error;

/// Errors from building, signing and verifying credential documents.
#[derive(Error, Debug)]
pub enum VcError {
    /// Canonicalization of the document or proof options failed.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] obadge_core::CanonicalizationError),

    /// Signing or signature verification failed.
    #[error(transparent)]
    Crypto(#[from] obadge_crypto::CryptoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is not a JSON object or lacks a required member.
    #[error("malformed credential: {0}")]
    Malformed(String),

    /// The document carries no `proof`.
    #[error("credential has no proof")]
    MissingProof,

    /// The proof object is present but not well formed.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// The proof uses a type or cryptosuite other than
    /// `DataIntegrityProof` / `eddsa-jcs-2022`.
    #[error("unsupported proof: {0}")]
    UnsupportedProof(String),
}
