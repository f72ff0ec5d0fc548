//! # obadge-vc: OpenBadges 3.0 Credentials
//!
//! Structure, signing and verification of the documents the engine
//! publishes:
//!
//! - [`OpenBadgeCredential`]: one per (wallet, achievement), carrying a
//!   `BitstringStatusListEntry` that points into the global revocation list.
//! - [`StatusListCredential`]: the signed `BitstringStatusListCredential`.
//! - [`DataIntegrityProof`]: `eddsa-jcs-2022` proofs over JCS-canonical
//!   JSON, created through an opaque [`obadge_crypto::KeyProvider`].
//!
//! Verification always operates on raw JSON values ([`verify_document`]),
//! so a third-party document with members this crate does not model still
//! verifies byte-for-byte.

pub mod credential;
pub mod error;
pub mod proof;
pub mod status_credential;

pub use credential::{
    credential_url, Achievement, AchievementSubject, AchievementTemplate, CredentialEnvelope,
    CredentialParams, IssuerProfile, OpenBadgeCredential, StatusEntry,
};
pub use error::VcError;
pub use proof::{secure, verify_document, DataIntegrityProof, ProofPurpose};
pub use status_credential::{StatusListCredential, StatusListSubject};
