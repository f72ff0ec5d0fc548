//! # Request Ledger
//!
//! Digests of applied requests, persisted as `request-ledger.json`. A
//! request whose digest is already recorded is a replay and is answered
//! with [`crate::Outcome::Unchanged`] without touching any state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use obadge_core::{ContentDigest, Timestamp};

/// What the ledger remembers about one applied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// When it was applied.
    pub applied_at: Timestamp,
    /// `request_type`.
    pub request_type: String,
    /// Outcome kind, e.g. `created`.
    pub outcome: String,
    /// Wallet the request ended up affecting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_slug: Option<String>,
}

/// Applied request digests, keyed by lowercase hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLedger {
    #[serde(default)]
    entries: BTreeMap<String, LedgerEntry>,
}

impl RequestLedger {
    /// The entry for `digest`, if the request was applied before.
    pub fn get(&self, digest: &ContentDigest) -> Option<&LedgerEntry> {
        self.entries.get(&digest.to_hex())
    }

    /// Record an applied request.
    pub fn record(&mut self, digest: &ContentDigest, entry: LedgerEntry) {
        self.entries.insert(digest.to_hex(), entry);
    }

    /// Number of recorded requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
