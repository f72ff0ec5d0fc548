//! # Status Registry
//!
//! The persisted bookkeeping behind the revocation list
//! (`status-registry.json`): which credential owns which bit, which bits are
//! set, and the next index to hand out.
//!
//! ```json
//! {
//!   "version": 7,
//!   "next_index": 3,
//!   "capacity_bits": 131072,
//!   "credentials": {
//!     "jane-doe/tsc-member-2026": {"index": 0, "revoked": false, "revoked_at": null,
//!                                  "issued_at": "2026-01-01T00:00:00Z"}
//!   },
//!   "retired": [{"key": "old-slug/contributor", "index": 1, "revoked": true, ...}]
//! }
//! ```
//!
//! ## Invariants
//!
//! - `next_index` only increases. An index, once allocated, is never handed
//!   out again, even after the credential is removed (its entry moves to
//!   `retired`, keeping the index and the bit).
//! - `capacity_bits` is a whole number of blocks and never shrinks.
//! - Every live index is unique and below `next_index`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use obadge_core::{CredentialKey, Slug, Timestamp};

use crate::bitstring::{capacity_for, Bitstring, BLOCK_BITS};
use crate::error::StatusError;

fn default_capacity() -> u64 {
    BLOCK_BITS
}

/// Status of one live credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Bit index in the list. Immutable.
    pub index: u64,
    /// Whether the bit is set.
    pub revoked: bool,
    /// When the credential was last revoked.
    #[serde(default)]
    pub revoked_at: Option<Timestamp>,
    /// When the index was allocated.
    pub issued_at: Timestamp,
}

/// An index whose credential was removed. Kept so the index is never reused
/// and the published bit stays as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetiredStatus {
    /// The credential that owned the index.
    pub key: CredentialKey,
    /// The index.
    pub index: u64,
    /// Bit value at removal time.
    pub revoked: bool,
    /// When the credential was removed.
    pub retired_at: Timestamp,
}

/// Counts reported by `obadge status --stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusStats {
    /// Live credentials.
    pub total: u64,
    /// Live revoked credentials.
    pub revoked: u64,
    /// Live active credentials.
    pub active: u64,
    /// Removed credentials whose indices are retired.
    pub retired: u64,
    /// Next index to allocate.
    pub next_index: u64,
    /// Current list length in bits.
    pub capacity_bits: u64,
}

/// The status registry document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRegistry {
    /// Bumped on every committed change.
    #[serde(default)]
    pub version: u64,
    /// Next index to allocate.
    pub next_index: u64,
    /// Current list length in bits.
    #[serde(default = "default_capacity")]
    pub capacity_bits: u64,
    /// Live credentials.
    #[serde(default)]
    pub credentials: BTreeMap<CredentialKey, StatusRecord>,
    /// Removed credentials.
    #[serde(default)]
    pub retired: Vec<RetiredStatus>,
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self {
            version: 0,
            next_index: 0,
            capacity_bits: BLOCK_BITS,
            credentials: BTreeMap::new(),
            retired: Vec::new(),
        }
    }
}

impl StatusRegistry {
    /// The live record for `key`.
    pub fn get(&self, key: &CredentialKey) -> Option<&StatusRecord> {
        self.credentials.get(key)
    }

    /// The live credential owning `index`.
    pub fn key_for_index(&self, index: u64) -> Option<&CredentialKey> {
        self.credentials
            .iter()
            .find(|(_, r)| r.index == index)
            .map(|(k, _)| k)
    }

    /// Allocate the next index for `key`, growing the list by a block when
    /// it is full.
    pub fn allocate(&mut self, key: &CredentialKey, at: Timestamp) -> Result<u64, StatusError> {
        if self.credentials.contains_key(key) {
            return Err(StatusError::AlreadyAllocated(key.clone()));
        }
        let index = self.next_index;
        self.next_index += 1;
        if index >= self.capacity_bits {
            self.capacity_bits = capacity_for(index + 1);
            tracing::info!(capacity_bits = self.capacity_bits, "status list grown");
        }
        self.credentials.insert(
            key.clone(),
            StatusRecord {
                index,
                revoked: false,
                revoked_at: None,
                issued_at: at,
            },
        );
        tracing::debug!(credential = %key, index, "status index allocated");
        Ok(index)
    }

    /// Set or clear the revocation bit of `key`. Returns whether anything
    /// changed.
    pub fn set_revoked(
        &mut self,
        key: &CredentialKey,
        revoked: bool,
        at: Timestamp,
    ) -> Result<bool, StatusError> {
        let record = self
            .credentials
            .get_mut(key)
            .ok_or_else(|| StatusError::NotFound(key.to_string()))?;
        if record.revoked == revoked {
            return Ok(false);
        }
        record.revoked = revoked;
        record.revoked_at = revoked.then_some(at);
        Ok(true)
    }

    /// Move the live entry of `from` to `to`, keeping index and bit.
    pub fn rename(&mut self, from: &CredentialKey, to: &CredentialKey) -> Result<(), StatusError> {
        if from == to {
            return Ok(());
        }
        if self.credentials.contains_key(to) {
            return Err(StatusError::AlreadyAllocated(to.clone()));
        }
        let record = self
            .credentials
            .remove(from)
            .ok_or_else(|| StatusError::NotFound(from.to_string()))?;
        self.credentials.insert(to.clone(), record);
        Ok(())
    }

    /// Rename every entry of wallet `from` to wallet `to`.
    pub fn rename_wallet(&mut self, from: &Slug, to: &Slug) -> Result<usize, StatusError> {
        let keys: Vec<CredentialKey> = self
            .credentials
            .keys()
            .filter(|k| &k.slug == from)
            .cloned()
            .collect();
        for key in &keys {
            self.rename(key, &key.rekey(to))?;
        }
        Ok(keys.len())
    }

    /// Retire the entry of `key`. The index stays allocated forever and the
    /// bit keeps its value.
    pub fn retire(&mut self, key: &CredentialKey, at: Timestamp) -> Result<RetiredStatus, StatusError> {
        let record = self
            .credentials
            .remove(key)
            .ok_or_else(|| StatusError::NotFound(key.to_string()))?;
        let retired = RetiredStatus {
            key: key.clone(),
            index: record.index,
            revoked: record.revoked,
            retired_at: at,
        };
        self.retired.push(retired.clone());
        Ok(retired)
    }

    /// The bitstring implied by the registry: one bit per revoked live or
    /// retired entry.
    pub fn to_bitstring(&self) -> Result<Bitstring, StatusError> {
        let mut bits = Bitstring::with_capacity_bits(self.capacity_bits);
        let live = self.credentials.values().filter(|r| r.revoked).map(|r| r.index);
        let retired = self.retired.iter().filter(|r| r.revoked).map(|r| r.index);
        for index in live.chain(retired) {
            bits.ensure_index(index);
            bits.set(index, true)?;
        }
        Ok(bits)
    }

    /// Summary counts.
    pub fn stats(&self) -> StatusStats {
        let total = self.credentials.len() as u64;
        let revoked = self.credentials.values().filter(|r| r.revoked).count() as u64;
        StatusStats {
            total,
            revoked,
            active: total - revoked,
            retired: self.retired.len() as u64,
            next_index: self.next_index,
            capacity_bits: self.capacity_bits,
        }
    }
}
