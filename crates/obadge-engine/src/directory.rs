//! # Wallet Directory
//!
//! The persistent mapping from recipient e-mail to wallet, and the source of
//! truth for identity. Persisted as `wallet-registry.json`:
//!
//! ```json
//! {
//!   "wallets": {"jane-doe": {"slug": "jane-doe", "email": "jane@example.com", ...}},
//!   "email_index": {"jane@example.com": "jane-doe"},
//!   "retired_slugs": ["old-slug"]
//! }
//! ```
//!
//! ## Invariants
//!
//! - An e-mail maps to at most one wallet (`email_index` is a bijection with
//!   the live wallets).
//! - A slug is unique across live wallets and retired slugs. A slug that
//!   has been retired is never live again.
//!
//! The directory is a plain value. The dispatcher clones it, mutates the
//! clone, and only replaces the committed copy after the whole change set
//! has been written.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use obadge_core::{AchievementId, CredentialKey, Email, Slug, Timestamp};

use crate::config::MergePolicy;
use crate::error::EngineError;

/// One issued credential as the directory records it. The signed document
/// itself is published at the credential's artifact path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Recipient name as it appears in the credential.
    pub recipient_name: String,
    /// Start of validity.
    pub valid_from: Timestamp,
    /// End of validity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<Timestamp>,
    /// Status list index. Assigned once, never changed.
    pub status_list_index: u64,
    /// Mirror of the status list bit.
    #[serde(default)]
    pub revoked: bool,
    /// When the credential was first issued.
    pub issued_at: Timestamp,
    /// When the document was last signed.
    pub signed_at: Timestamp,
    /// Hex SHA-256 of the JCS form of the signed document.
    #[serde(default)]
    pub document_digest: String,
}

impl CredentialRecord {
    /// Field identity used by merges and idempotent creates: name, validity
    /// window and revocation state. Index, timestamps and digest are not
    /// compared.
    pub fn same_fields(&self, other: &Self) -> bool {
        self.recipient_name == other.recipient_name
            && self.valid_from == other.valid_from
            && self.valid_until == other.valid_until
            && self.revoked == other.revoked
    }
}

/// A recipient's credential collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Current slug.
    pub slug: Slug,
    /// Recipient e-mail (normalized).
    pub email: Email,
    /// Display name.
    pub display_name: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last slug change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_at: Option<Timestamp>,
    /// Slugs this wallet held before, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_slugs: Vec<Slug>,
    /// Credentials keyed by achievement.
    #[serde(default)]
    pub credentials: BTreeMap<AchievementId, CredentialRecord>,
}

impl Wallet {
    /// The composite key of one of this wallet's credentials.
    pub fn key(&self, achievement: &AchievementId) -> CredentialKey {
        CredentialKey::new(self.slug.clone(), achievement.clone())
    }

    /// Keys of every credential in the wallet.
    pub fn keys(&self) -> Vec<CredentialKey> {
        self.credentials.keys().map(|a| self.key(a)).collect()
    }
}

/// What a merge did with each achievement of the source wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Moved into the destination (no clash).
    pub moved: Vec<AchievementId>,
    /// Present on both sides; the destination copy survived and the source
    /// copy was dropped.
    pub kept_destination: Vec<AchievementId>,
    /// Present on both sides; the source copy replaced the destination's.
    pub replaced: Vec<AchievementId>,
}

/// The wallet registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDirectory {
    /// Live wallets by slug.
    #[serde(default)]
    wallets: BTreeMap<Slug, Wallet>,
    /// E-mail to slug.
    #[serde(default)]
    email_index: BTreeMap<Email, Slug>,
    /// Slugs that can never be assigned again.
    #[serde(default)]
    retired_slugs: BTreeSet<Slug>,
}

impl WalletDirectory {
    /// Number of live wallets.
    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    /// Whether there are no live wallets.
    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Live wallets in slug order.
    pub fn wallets(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.values()
    }

    /// Retired slugs.
    pub fn retired_slugs(&self) -> &BTreeSet<Slug> {
        &self.retired_slugs
    }

    /// Wallet by slug.
    pub fn get(&self, slug: &Slug) -> Option<&Wallet> {
        self.wallets.get(slug)
    }

    /// Mutable wallet by slug.
    pub fn get_mut(&mut self, slug: &Slug) -> Option<&mut Wallet> {
        self.wallets.get_mut(slug)
    }

    /// Slug of the wallet owning `email`.
    pub fn slug_for(&self, email: &Email) -> Option<&Slug> {
        self.email_index.get(email)
    }

    /// Wallet owning `email`.
    pub fn by_email(&self, email: &Email) -> Option<&Wallet> {
        self.slug_for(email).and_then(|s| self.wallets.get(s))
    }

    /// Wallet owning `email`, or `NotFound`.
    pub fn require_email(&self, email: &Email) -> Result<&Wallet, EngineError> {
        self.by_email(email)
            .ok_or_else(|| EngineError::NotFound(format!("no wallet for {email}")))
    }

    /// Credential record by key.
    pub fn credential(&self, key: &CredentialKey) -> Option<&CredentialRecord> {
        self.wallets.get(&key.slug)?.credentials.get(&key.achievement)
    }

    /// Mutable credential record by key.
    pub fn credential_mut(&mut self, key: &CredentialKey) -> Option<&mut CredentialRecord> {
        self.wallets
            .get_mut(&key.slug)?
            .credentials
            .get_mut(&key.achievement)
    }

    /// Whether `slug` is live or retired.
    pub fn is_taken(&self, slug: &Slug) -> bool {
        self.wallets.contains_key(slug) || self.retired_slugs.contains(slug)
    }

    /// Register a new, empty wallet.
    pub fn create_wallet(
        &mut self,
        slug: Slug,
        email: Email,
        display_name: &str,
        now: Timestamp,
    ) -> Result<&mut Wallet, EngineError> {
        if self.is_taken(&slug) {
            return Err(EngineError::Conflict(format!("slug {slug} is already taken")));
        }
        if let Some(owner) = self.email_index.get(&email) {
            return Err(EngineError::Conflict(format!(
                "{email} already owns wallet {owner}"
            )));
        }
        self.email_index.insert(email.clone(), slug.clone());
        tracing::debug!(%slug, "wallet created");
        Ok(self.wallets.entry(slug.clone()).or_insert(Wallet {
            slug,
            email,
            display_name: display_name.trim().to_string(),
            created_at: now,
            renamed_at: None,
            previous_slugs: Vec::new(),
            credentials: BTreeMap::new(),
        }))
    }

    /// Delete a wallet, retire its slug and release its e-mail.
    pub fn remove_wallet(&mut self, slug: &Slug) -> Result<Wallet, EngineError> {
        let wallet = self
            .wallets
            .remove(slug)
            .ok_or_else(|| EngineError::NotFound(format!("wallet {slug}")))?;
        self.email_index.remove(&wallet.email);
        self.retired_slugs.insert(slug.clone());
        tracing::debug!(%slug, "wallet removed, slug retired");
        Ok(wallet)
    }

    /// Give a wallet a new slug. The old slug is retired.
    pub fn rename_wallet(&mut self, from: &Slug, to: Slug, now: Timestamp) -> Result<(), EngineError> {
        if self.is_taken(&to) {
            return Err(EngineError::Conflict(format!("slug {to} is already taken")));
        }
        let mut wallet = self
            .wallets
            .remove(from)
            .ok_or_else(|| EngineError::NotFound(format!("wallet {from}")))?;
        wallet.previous_slugs.push(from.clone());
        wallet.slug = to.clone();
        wallet.renamed_at = Some(now);
        self.email_index.insert(wallet.email.clone(), to.clone());
        self.retired_slugs.insert(from.clone());
        self.wallets.insert(to, wallet);
        Ok(())
    }

    /// Move a wallet to a new e-mail that owns no wallet. The slug is kept.
    pub fn change_email(&mut self, slug: &Slug, email: Email) -> Result<(), EngineError> {
        if let Some(owner) = self.email_index.get(&email) {
            return Err(EngineError::Conflict(format!("{email} already owns wallet {owner}")));
        }
        let wallet = self
            .wallets
            .get_mut(slug)
            .ok_or_else(|| EngineError::NotFound(format!("wallet {slug}")))?;
        self.email_index.remove(&wallet.email);
        wallet.email = email.clone();
        self.email_index.insert(email, slug.clone());
        Ok(())
    }

    /// Merge wallet `source` into `dest` under `policy`.
    ///
    /// On success the source wallet is gone, its slug retired and its e-mail
    /// released. On error nothing has changed.
    pub fn merge(
        &mut self,
        source: &Slug,
        dest: &Slug,
        policy: MergePolicy,
    ) -> Result<MergeReport, EngineError> {
        if source == dest {
            return Err(EngineError::Conflict(format!("cannot merge wallet {source} into itself")));
        }
        let src = self
            .wallets
            .get(source)
            .ok_or_else(|| EngineError::NotFound(format!("wallet {source}")))?;
        let dst = self
            .wallets
            .get(dest)
            .ok_or_else(|| EngineError::NotFound(format!("wallet {dest}")))?;

        let mut report = MergeReport::default();
        for (ach, record) in &src.credentials {
            match dst.credentials.get(ach) {
                None => report.moved.push(ach.clone()),
                Some(existing) => match policy {
                    MergePolicy::RejectUnlessIdentical if existing.same_fields(record) => {
                        report.kept_destination.push(ach.clone())
                    }
                    MergePolicy::RejectUnlessIdentical => {
                        return Err(EngineError::Conflict(format!(
                            "wallets {source} and {dest} both hold {ach} with different fields"
                        )))
                    }
                    MergePolicy::PreferDestination => report.kept_destination.push(ach.clone()),
                    MergePolicy::PreferSource => report.replaced.push(ach.clone()),
                },
            }
        }

        let src = self.remove_wallet(source)?;
        let dst = self
            .wallets
            .get_mut(dest)
            .ok_or_else(|| EngineError::NotFound(format!("wallet {dest}")))?;
        for (ach, record) in src.credentials {
            if report.kept_destination.contains(&ach) {
                continue;
            }
            dst.credentials.insert(ach, record);
        }
        tracing::debug!(
            %source, %dest,
            moved = report.moved.len(),
            kept = report.kept_destination.len(),
            replaced = report.replaced.len(),
            "wallets merged"
        );
        Ok(report)
    }

    /// Check the directory's invariants; returns every violation found.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (slug, wallet) in &self.wallets {
            if &wallet.slug != slug {
                problems.push(format!("wallet keyed {slug} records slug {}", wallet.slug));
            }
            if self.email_index.get(&wallet.email) != Some(slug) {
                problems.push(format!("{} does not index to {slug}", wallet.email));
            }
            if self.retired_slugs.contains(slug) {
                problems.push(format!("live slug {slug} is also retired"));
            }
        }
        for (email, slug) in &self.email_index {
            if !self.wallets.contains_key(slug) {
                problems.push(format!("{email} indexes missing wallet {slug}"));
            }
        }
        problems
    }
}
