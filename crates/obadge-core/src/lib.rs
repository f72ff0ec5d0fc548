#![deny(missing_docs)]

//! # obadge-core: Foundational Types for the Credential Engine
//!
//! Every other crate in the workspace builds on the types defined here. The
//! crate has no internal dependencies, only `serde`, `serde_json`,
//! `serde_jcs`, `thiserror`, `chrono`, `sha2` and `tracing`.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** An [`Email`] cannot be passed where
//!    a [`Slug`] is expected, and a [`CredentialKey`] is always the validated
//!    pair `wallet_slug/achievement_id`.
//!
//! 2. **[`CanonicalBytes`] is the sole signing and digest input.** Every
//!    signature and every request digest flows through `CanonicalBytes::new()`
//!    (RFC 8785 JCS with float rejection).
//!
//! 3. **Whole-file replacement.** Persistent state is never edited in place.
//!    [`fsio::write_atomic`] writes a sibling temp file, syncs it and renames
//!    it over the target.
//!
//! 4. **One writer at a time.** [`WorkspaceLock`] is the cross-process
//!    critical section around the wallet directory and the status list.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod fsio;
pub mod identity;
pub mod lock;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest};
pub use error::{CanonicalizationError, StorageError, ValidationError};
pub use identity::{slugify, AchievementId, CredentialKey, Email, Slug};
pub use lock::WorkspaceLock;
pub use temporal::Timestamp;
