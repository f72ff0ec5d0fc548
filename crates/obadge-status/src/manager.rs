//! # Status List Manager
//!
//! Owns the versioned status registry and renders the signed
//! `BitstringStatusListCredential` from it.
//!
//! ## Concurrency
//!
//! - In process, a `parking_lot::Mutex` guards the loaded registry. A
//!   [`StatusTxn`] holds the guard for its whole life, so two transactions
//!   never interleave.
//! - Across processes, callers hold the workspace lock. As a second line,
//!   [`StatusTxn::prepare`] re-reads the on-disk `version` and refuses to
//!   produce a commit if it no longer matches the version this manager
//!   loaded.
//!
//! A transaction works on a clone. Dropping it without [`StatusTxn::commit`]
//! leaves the loaded state untouched.

use std::path::PathBuf;

use parking_lot::{Mutex, MutexGuard};

use obadge_core::fsio::{read_json_opt, write_atomic};
use obadge_core::{CredentialKey, Timestamp};
use obadge_crypto::KeyProvider;
use obadge_vc::StatusListCredential;

use crate::error::StatusError;
use crate::registry::{StatusRegistry, StatusStats};

/// Where the status list lives and who signs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusListSettings {
    /// Public URL of the status list credential.
    pub list_url: String,
    /// Issuer id placed in the status list credential.
    pub issuer_id: String,
    /// `status-registry.json`.
    pub registry_path: PathBuf,
    /// Published list, e.g. `docs/status/revocation-list`.
    pub list_path: PathBuf,
}

/// A fully rendered, not yet persisted, status state.
#[derive(Debug, Clone)]
pub struct PreparedStatus {
    /// The registry with its version bumped.
    pub registry: StatusRegistry,
    /// Serialized registry.
    pub registry_bytes: Vec<u8>,
    /// The signed list credential.
    pub list: StatusListCredential,
    /// Serialized list credential.
    pub list_bytes: Vec<u8>,
}

/// Owner of the status registry.
#[derive(Debug)]
pub struct StatusListManager {
    settings: StatusListSettings,
    state: Mutex<StatusRegistry>,
}

impl StatusListManager {
    /// Load the registry from disk, or start empty if none exists.
    pub fn open(settings: StatusListSettings) -> Result<Self, StatusError> {
        let registry: StatusRegistry = read_json_opt(&settings.registry_path)?.unwrap_or_default();
        tracing::debug!(
            registry = %settings.registry_path.display(),
            version = registry.version,
            next_index = registry.next_index,
            "status registry loaded"
        );
        Ok(Self {
            settings,
            state: Mutex::new(registry),
        })
    }

    /// Replace the loaded registry with the one on disk. Call after taking
    /// the workspace lock so the next transaction starts from the
    /// authoritative copy.
    pub fn reload(&self) -> Result<(), StatusError> {
        let registry: StatusRegistry =
            read_json_opt(&self.settings.registry_path)?.unwrap_or_default();
        let mut state = self.state.lock();
        if state.version != registry.version {
            tracing::debug!(from = state.version, to = registry.version, "status registry reloaded");
        }
        *state = registry;
        Ok(())
    }

    /// Configured locations.
    pub fn settings(&self) -> &StatusListSettings {
        &self.settings
    }

    /// A copy of the loaded registry.
    pub fn snapshot(&self) -> StatusRegistry {
        self.state.lock().clone()
    }

    /// Summary counts of the loaded registry.
    pub fn stats(&self) -> StatusStats {
        self.state.lock().stats()
    }

    /// Start a transaction. Blocks while another transaction is open.
    pub fn begin(&self) -> StatusTxn<'_> {
        let guard = self.state.lock();
        let working = guard.clone();
        StatusTxn {
            settings: &self.settings,
            guard,
            working,
        }
    }

    /// Allocate an index for `key` and persist the registry and list.
    pub fn allocate_index(
        &self,
        key: &CredentialKey,
        provider: &dyn KeyProvider,
        now: Timestamp,
    ) -> Result<u64, StatusError> {
        let mut txn = self.begin();
        let index = txn.registry_mut().allocate(key, now)?;
        let prepared = txn.prepare(provider, now)?;
        txn.persist(prepared)?;
        Ok(index)
    }

    /// Set or clear the bit at `index` (which must belong to a live
    /// credential) and persist. Returns whether the bit changed.
    pub fn set_bit(
        &self,
        index: u64,
        value: bool,
        provider: &dyn KeyProvider,
        now: Timestamp,
    ) -> Result<bool, StatusError> {
        let mut txn = self.begin();
        let key = txn
            .registry()
            .key_for_index(index)
            .cloned()
            .ok_or_else(|| StatusError::NotFound(format!("status index {index}")))?;
        let changed = txn.registry_mut().set_revoked(&key, value, now)?;
        if changed {
            let prepared = txn.prepare(provider, now)?;
            txn.persist(prepared)?;
        }
        Ok(changed)
    }

    /// Render and sign the list credential for the loaded registry without
    /// persisting anything.
    pub fn render(
        &self,
        provider: &dyn KeyProvider,
        now: Timestamp,
    ) -> Result<StatusListCredential, StatusError> {
        let guard = self.state.lock();
        render_list(&self.settings, &guard, provider, now)
    }

    /// Re-render, re-sign and persist the list (and registry) as they are.
    pub fn update(&self, provider: &dyn KeyProvider, now: Timestamp) -> Result<PreparedStatus, StatusError> {
        let txn = self.begin();
        let prepared = txn.prepare(provider, now)?;
        txn.persist(prepared.clone())?;
        Ok(prepared)
    }
}

fn render_list(
    settings: &StatusListSettings,
    registry: &StatusRegistry,
    provider: &dyn KeyProvider,
    now: Timestamp,
) -> Result<StatusListCredential, StatusError> {
    let encoded = registry.to_bitstring()?.encode()?;
    Ok(StatusListCredential::build(&settings.list_url, &settings.issuer_id, encoded, now)
        .sign(provider, now)?)
}

fn pretty(value: &impl serde::Serialize) -> Result<Vec<u8>, StatusError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(obadge_vc::VcError::from)?;
    bytes.push(b'\n');
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// An open status transaction holding the manager's lock.
pub struct StatusTxn<'a> {
    settings: &'a StatusListSettings,
    guard: MutexGuard<'a, StatusRegistry>,
    working: StatusRegistry,
}

impl StatusTxn<'_> {
    /// The working copy.
    pub fn registry(&self) -> &StatusRegistry {
        &self.working
    }

    /// Mutable access to the working copy.
    pub fn registry_mut(&mut self) -> &mut StatusRegistry {
        &mut self.working
    }

    /// The registry as loaded, before any change in this transaction.
    pub fn original(&self) -> &StatusRegistry {
        &self.guard
    }

    /// Whether the working copy differs from the loaded registry.
    pub fn is_dirty(&self) -> bool {
        self.working != *self.guard
    }

    /// Render the working copy: bump its version, encode and sign the list,
    /// serialize both documents.
    ///
    /// # Errors
    ///
    /// [`StatusError::VersionConflict`] if the registry on disk is no longer
    /// the version this manager loaded.
    pub fn prepare(&self, provider: &dyn KeyProvider, now: Timestamp) -> Result<PreparedStatus, StatusError> {
        let on_disk: Option<StatusRegistry> = read_json_opt(&self.settings.registry_path)?;
        let found = on_disk.map(|r| r.version).unwrap_or(0);
        if found != self.guard.version {
            return Err(StatusError::VersionConflict {
                expected: self.guard.version,
                found,
            });
        }
        let mut registry = self.working.clone();
        registry.version = self.guard.version + 1;
        let list = render_list(self.settings, &registry, provider, now)?;
        Ok(PreparedStatus {
            registry_bytes: pretty(&registry)?,
            list_bytes: list.to_pretty_bytes()?,
            registry,
            list,
        })
    }

    /// Record that `prepared` has been written to disk by the caller.
    pub fn commit(mut self, prepared: PreparedStatus) {
        tracing::debug!(version = prepared.registry.version, "status registry committed");
        *self.guard = prepared.registry;
    }

    /// Write both files atomically (list first, then registry) and commit.
    pub fn persist(self, prepared: PreparedStatus) -> Result<(), StatusError> {
        write_atomic(&self.settings.list_path, &prepared.list_bytes)?;
        write_atomic(&self.settings.registry_path, &prepared.registry_bytes)?;
        self.commit(prepared);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstring::Bitstring;
    use obadge_crypto::LocalKeyProvider;
    use obadge_vc::verify_document;

    fn setup() -> (tempfile::TempDir, StatusListSettings, LocalKeyProvider) {
        let dir = tempfile::tempdir().unwrap();
        let settings = StatusListSettings {
            list_url: "https://credentials.cognipilot.org/status/revocation-list".into(),
            issuer_id: "did:web:credentials.cognipilot.org".into(),
            registry_path: dir.path().join("status-registry.json"),
            list_path: dir.path().join("docs/status/revocation-list"),
        };
        let provider = LocalKeyProvider::generate("did:web:credentials.cognipilot.org#key-1");
        (dir, settings, provider)
    }

    fn key(s: &str) -> CredentialKey {
        CredentialKey::parse(s).unwrap()
    }

    fn load_list(settings: &StatusListSettings) -> StatusListCredential {
        let v: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&settings.list_path).unwrap()).unwrap();
        StatusListCredential::from_value(&v).unwrap()
    }

    #[test]
    fn allocate_persists_registry_and_list() {
        let (_dir, settings, p) = setup();
        let m = StatusListManager::open(settings.clone()).unwrap();
        assert_eq!(m.allocate_index(&key("a/x"), &p, Timestamp::now()).unwrap(), 0);
        assert_eq!(m.allocate_index(&key("b/x"), &p, Timestamp::now()).unwrap(), 1);

        let reopened = StatusListManager::open(settings.clone()).unwrap();
        assert_eq!(reopened.snapshot().next_index, 2);
        assert_eq!(reopened.snapshot().version, 2);
        assert!(settings.list_path.exists());
    }

    #[test]
    fn set_bit_flips_one_published_bit() {
        let (_dir, settings, p) = setup();
        let m = StatusListManager::open(settings.clone()).unwrap();
        for k in ["a/x", "b/x", "c/x"] {
            m.allocate_index(&key(k), &p, Timestamp::now()).unwrap();
        }
        let before = Bitstring::decode(&load_list(&settings).credential_subject.encoded_list).unwrap();
        assert!(m.set_bit(1, true, &p, Timestamp::now()).unwrap());
        let after = Bitstring::decode(&load_list(&settings).credential_subject.encoded_list).unwrap();

        let diff: Vec<u64> = (0..after.len_bits())
            .filter(|&i| before.get(i).unwrap() != after.get(i).unwrap())
            .collect();
        assert_eq!(diff, vec![1]);
        assert!(!m.set_bit(1, true, &p, Timestamp::now()).unwrap());
    }

    #[test]
    fn set_bit_on_unknown_index_is_not_found() {
        let (_dir, settings, p) = setup();
        let m = StatusListManager::open(settings).unwrap();
        assert!(matches!(
            m.set_bit(5, true, &p, Timestamp::now()),
            Err(StatusError::NotFound(_))
        ));
    }

    #[test]
    fn published_list_is_signed() {
        let (_dir, settings, p) = setup();
        let m = StatusListManager::open(settings.clone()).unwrap();
        m.update(&p, Timestamp::now()).unwrap();
        let v: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&settings.list_path).unwrap()).unwrap();
        assert!(verify_document(&v, &p.public_key().unwrap()).is_ok());
        assert_eq!(v["credentialSubject"]["type"], "BitstringStatusList");
    }

    #[test]
    fn dropped_transaction_changes_nothing() {
        let (_dir, settings, p) = setup();
        let m = StatusListManager::open(settings).unwrap();
        {
            let mut txn = m.begin();
            txn.registry_mut().allocate(&key("a/x"), Timestamp::now()).unwrap();
            assert!(txn.is_dirty());
            let _ = txn.prepare(&p, Timestamp::now()).unwrap();
        }
        assert_eq!(m.snapshot().next_index, 0);
        assert_eq!(m.snapshot().version, 0);
    }

    #[test]
    fn concurrent_disk_change_is_detected() {
        let (_dir, settings, p) = setup();
        let stale = StatusListManager::open(settings.clone()).unwrap();
        let fresh = StatusListManager::open(settings).unwrap();
        fresh.allocate_index(&key("a/x"), &p, Timestamp::now()).unwrap();

        let err = stale.allocate_index(&key("b/x"), &p, Timestamp::now()).unwrap_err();
        assert!(matches!(err, StatusError::VersionConflict { expected: 0, found: 1 }));

        stale.reload().unwrap();
        assert_eq!(stale.allocate_index(&key("b/x"), &p, Timestamp::now()).unwrap(), 1);
    }

    #[test]
    fn transactions_serialize_across_threads() {
        let (_dir, settings, p) = setup();
        let m = std::sync::Arc::new(StatusListManager::open(settings).unwrap());
        let p = std::sync::Arc::new(p);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let m = m.clone();
                let p = p.clone();
                std::thread::spawn(move || {
                    m.allocate_index(&key(&format!("w{i}/x")), p.as_ref(), Timestamp::now())
                        .unwrap()
                })
            })
            .collect();
        let mut indices: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
        assert_eq!(m.snapshot().version, 8);
    }

    #[test]
    fn stats_reflect_registry() {
        let (_dir, settings, p) = setup();
        let m = StatusListManager::open(settings).unwrap();
        m.allocate_index(&key("a/x"), &p, Timestamp::now()).unwrap();
        m.allocate_index(&key("b/x"), &p, Timestamp::now()).unwrap();
        m.set_bit(0, true, &p, Timestamp::now()).unwrap();
        let s = m.stats();
        assert_eq!((s.total, s.revoked, s.active, s.next_index), (2, 1, 1, 2));
    }
}
