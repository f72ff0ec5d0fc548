//! # obadge-status: Bitstring Status List
//!
//! One global revocation list for every issued credential.
//!
//! - [`Bitstring`]: MSB-first bits, gzip + base64url wire form, grows in
//!   131072-bit blocks.
//! - [`StatusRegistry`]: which credential owns which bit; indices are never
//!   reused.
//! - [`StatusListManager`]: versioned, mutex-guarded access to the registry
//!   and rendering of the signed `BitstringStatusListCredential`.
//!
//! Verifiers use [`status_bit`] to read a credential's bit out of a fetched
//! or local list credential.

pub mod bitstring;
pub mod error;
pub mod manager;
pub mod registry;

pub use bitstring::{Bitstring, BLOCK_BITS};
pub use error::StatusError;
pub use manager::{PreparedStatus, StatusListManager, StatusListSettings, StatusTxn};
pub use registry::{RetiredStatus, StatusRecord, StatusRegistry, StatusStats};

/// Read bit `index` from a status list credential.
pub fn status_bit(list: &obadge_vc::StatusListCredential, index: u64) -> Result<bool, StatusError> {
    Bitstring::decode(&list.credential_subject.encoded_list)?.get(index)
}
