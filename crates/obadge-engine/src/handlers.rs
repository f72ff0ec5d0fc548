//! # Request Handlers
//!
//! One method per request kind. Handlers only touch the [`Draft`]: the
//! cloned directory, the status transaction's working registry and the
//! queued artifact operations. The dispatcher decides whether any of it is
//! committed.
//!
//! Publishing a credential means building the OpenBadges document from the
//! directory record, signing it, and queueing `credential.json` plus a baked
//! copy of each badge template the achievement has. Retracting queues the
//! deletion of all three artifacts.

use std::collections::BTreeSet;

use obadge_bake::ImageKind;
use obadge_core::{sha256_digest, AchievementId, CanonicalBytes, CredentialKey, Slug};
use obadge_vc::{CredentialParams, OpenBadgeCredential, StatusEntry};

use crate::directory::{CredentialRecord, MergeReport};
use crate::engine::{Draft, Engine};
use crate::error::EngineError;
use crate::outcome::Outcome;
use crate::request::{
    window, CreateRequest, RemoveRequest, RenameRequest, RevokeRequest, RevokeTarget, UpdateRequest,
};

fn missing(key: &CredentialKey) -> EngineError {
    EngineError::NotFound(format!("credential {key}"))
}

impl Engine {
    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Sign the credential for `key` and queue its artifacts.
    pub(crate) fn publish(&self, d: &mut Draft<'_>, key: &CredentialKey) -> Result<(), EngineError> {
        let wallet = d.dir.get(&key.slug).ok_or_else(|| missing(key))?;
        let record = wallet.credentials.get(&key.achievement).ok_or_else(|| missing(key))?;
        let template = self.catalog().get(&key.achievement)?;
        let issuer = self.config().issuer.profile();
        let credential = OpenBadgeCredential::build(CredentialParams {
            base_url: &self.config().base_url,
            issuer: &issuer,
            slug: &key.slug,
            achievement_id: &key.achievement,
            achievement: template,
            email: &wallet.email,
            recipient_name: &record.recipient_name,
            valid_from: record.valid_from,
            valid_until: record.valid_until,
            status: StatusEntry::revocation(&self.config().status_list_url, record.status_list_index),
        })
        .sign(self.provider(), d.now)?;
        let bytes = credential.to_pretty_bytes()?;
        let digest = sha256_digest(&CanonicalBytes::new(&credential)?).to_hex();

        d.changes.write(self.paths().credential_json(key), bytes.clone());
        let mut baked = 0;
        for kind in [ImageKind::Svg, ImageKind::Png] {
            let target = self.paths().badge(key, kind);
            match self.catalog().template(&key.achievement, kind)? {
                Some(image) => {
                    let out = obadge_bake::bake(&bytes, &image, kind, &self.config().verify_url)?;
                    d.changes.write(target, out);
                    baked += 1;
                }
                // Drop a stale badge left by an earlier template.
                None => d.changes.delete(target),
            }
        }
        if baked == 0 {
            tracing::warn!(credential = %key, "no badge template, credential published without a baked badge");
        }

        let record = d.dir.credential_mut(key).ok_or_else(|| missing(key))?;
        record.signed_at = d.now;
        record.document_digest = digest;
        tracing::debug!(credential = %key, baked, "credential signed");
        Ok(())
    }

    /// Queue deletion of every artifact of `key`.
    pub(crate) fn retract(&self, d: &mut Draft<'_>, key: &CredentialKey) {
        d.changes.delete(self.paths().credential_json(key));
        d.changes.delete(self.paths().badge(key, ImageKind::Svg));
        d.changes.delete(self.paths().badge(key, ImageKind::Png));
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    pub(crate) fn create(&self, d: &mut Draft<'_>, r: &CreateRequest) -> Result<Outcome, EngineError> {
        self.catalog().get(&r.achievement)?;
        let name = r.recipient_name.trim();

        let (slug, new_wallet) = match d.dir.slug_for(&r.recipient_email).cloned() {
            Some(slug) => {
                if r.wallet_slug.is_some() || r.anonymize_slug {
                    tracing::debug!(%slug, "wallet exists, slug options ignored");
                }
                (slug, false)
            }
            None => {
                let mut rng = rand::thread_rng();
                let slug = if r.anonymize_slug {
                    self.slugs().anonymous(&d.dir, &mut rng)?
                } else if let Some(requested) = &r.wallet_slug {
                    self.slugs().custom(requested, &d.dir)?
                } else {
                    self.slugs().derive(name, &d.dir, &mut rng)?
                };
                d.dir.create_wallet(slug.clone(), r.recipient_email.clone(), name, d.now)?;
                (slug, true)
            }
        };

        let key = CredentialKey::new(slug.clone(), r.achievement.clone());
        let revoked = r.status.is_some_and(|s| s.is_revoked());
        let mut record = CredentialRecord {
            recipient_name: name.to_string(),
            valid_from: r.valid_from.unwrap_or(d.now),
            valid_until: r.valid_until,
            status_list_index: 0,
            revoked,
            issued_at: d.now,
            signed_at: d.now,
            document_digest: String::new(),
        };

        if let Some(existing) = d.dir.credential(&key) {
            let mut candidate = record.clone();
            if r.valid_from.is_none() {
                candidate.valid_from = existing.valid_from;
            }
            if existing.same_fields(&candidate) {
                return Ok(Outcome::Unchanged {
                    wallet: Some(slug),
                    credential: Some(key),
                    reason: "credential already issued with identical fields".into(),
                });
            }
            return Err(EngineError::Conflict(format!(
                "{key} already exists with different fields; use an update request"
            )));
        }
        window(Some(record.valid_from), record.valid_until)?;

        record.status_list_index = d.status.allocate(&key, d.now)?;
        if revoked {
            d.status.set_revoked(&key, true, d.now)?;
        }
        let index = record.status_list_index;
        d.dir
            .get_mut(&slug)
            .ok_or_else(|| EngineError::NotFound(format!("wallet {slug}")))?
            .credentials
            .insert(r.achievement.clone(), record);
        self.publish(d, &key)?;

        Ok(Outcome::Created {
            credential: key,
            status_list_index: index,
            new_wallet,
        })
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    pub(crate) fn update(&self, d: &mut Draft<'_>, r: &UpdateRequest) -> Result<Outcome, EngineError> {
        let source = d.dir.require_email(&r.old_email)?.slug.clone();
        let key = CredentialKey::new(source.clone(), r.achievement.clone());
        let before = d.dir.credential(&key).cloned().ok_or_else(|| missing(&key))?;

        let mut after = before.clone();
        if let Some(name) = &r.recipient_name {
            after.recipient_name = name.trim().to_string();
        }
        if let Some(from) = r.valid_from {
            after.valid_from = from;
        }
        if let Some(until) = r.valid_until {
            after.valid_until = until;
        }
        if let Some(state) = r.status {
            after.revoked = state.is_revoked();
        }
        window(Some(after.valid_from), after.valid_until)?;

        let content_changed = after.recipient_name != before.recipient_name
            || after.valid_from != before.valid_from
            || after.valid_until != before.valid_until;
        let revoked_changed = after.revoked != before.revoked;
        if revoked_changed {
            d.status.set_revoked(&key, after.revoked, d.now)?;
        }
        if after.recipient_name != before.recipient_name {
            if let Some(wallet) = d.dir.get_mut(&source) {
                wallet.display_name = after.recipient_name.clone();
            }
        }
        let index = after.status_list_index;
        let now_revoked = after.revoked;
        *d.dir.credential_mut(&key).ok_or_else(|| missing(&key))? = after;

        if r.recipient_email != r.old_email {
            return match d.dir.slug_for(&r.recipient_email).cloned() {
                None => {
                    d.dir.change_email(&source, r.recipient_email.clone())?;
                    let keys = d.dir.get(&source).map(|w| w.keys()).unwrap_or_default();
                    for k in &keys {
                        self.publish(d, k)?;
                    }
                    Ok(Outcome::Updated {
                        wallet: source,
                        credentials: keys,
                        email_changed: true,
                    })
                }
                Some(dest) => self.merge_into(d, &source, &dest),
            };
        }

        if content_changed {
            self.publish(d, &key)?;
            return Ok(Outcome::Updated {
                wallet: source,
                credentials: vec![key],
                email_changed: false,
            });
        }
        if revoked_changed {
            return Ok(if now_revoked {
                Outcome::Revoked { credential: key, status_list_index: index }
            } else {
                Outcome::Restored { credential: key, status_list_index: index }
            });
        }
        Ok(Outcome::Unchanged {
            wallet: Some(source),
            credential: Some(key),
            reason: "update matches the current credential".into(),
        })
    }

    /// Merge wallet `source` into `dest` and carry the status registry and
    /// artifacts along.
    fn merge_into(&self, d: &mut Draft<'_>, source: &Slug, dest: &Slug) -> Result<Outcome, EngineError> {
        let MergeReport {
            moved,
            kept_destination,
            replaced,
        } = d.dir.merge(source, dest, self.config().merge_policy)?;
        let src_key = |a: &AchievementId| CredentialKey::new(source.clone(), a.clone());
        let dst_key = |a: &AchievementId| CredentialKey::new(dest.clone(), a.clone());

        let mut published = Vec::new();
        for ach in &moved {
            d.status.rename(&src_key(ach), &dst_key(ach))?;
            self.retract(d, &src_key(ach));
            published.push(dst_key(ach));
        }
        for ach in &replaced {
            d.status.retire(&dst_key(ach), d.now)?;
            d.status.rename(&src_key(ach), &dst_key(ach))?;
            self.retract(d, &src_key(ach));
            published.push(dst_key(ach));
        }
        let mut dropped = Vec::new();
        for ach in &kept_destination {
            d.status.retire(&src_key(ach), d.now)?;
            self.retract(d, &src_key(ach));
            dropped.push(src_key(ach));
        }
        for key in &published {
            self.publish(d, key)?;
        }
        published.sort();
        Ok(Outcome::Merged {
            from: source.clone(),
            into: dest.clone(),
            credentials: published,
            dropped,
        })
    }

    // -----------------------------------------------------------------------
    // Rename
    // -----------------------------------------------------------------------

    pub(crate) fn rename(&self, d: &mut Draft<'_>, r: &RenameRequest) -> Result<Outcome, EngineError> {
        let wallet = d.dir.require_email(&r.recipient_email)?;
        let from = wallet.slug.clone();
        let old_keys = wallet.keys();
        let new_name = r
            .recipient_name
            .as_deref()
            .map(str::trim)
            .filter(|n| *n != wallet.display_name)
            .map(str::to_string);

        let to = match &r.new_wallet_slug {
            Some(requested) => Slug::from_text(requested)?,
            None => self.slugs().anonymous(&d.dir, &mut rand::thread_rng())?,
        };
        if to == from {
            return match new_name {
                Some(name) => {
                    if let Some(w) = d.dir.get_mut(&from) {
                        w.display_name = name;
                    }
                    Ok(Outcome::Updated {
                        wallet: from,
                        credentials: Vec::new(),
                        email_changed: false,
                    })
                }
                None => Ok(Outcome::Unchanged {
                    wallet: Some(from),
                    credential: None,
                    reason: "wallet already has this slug".into(),
                }),
            };
        }

        d.dir.rename_wallet(&from, to.clone(), d.now)?;
        d.status.rename_wallet(&from, &to)?;
        if let Some(name) = new_name {
            if let Some(w) = d.dir.get_mut(&to) {
                w.display_name = name;
            }
        }
        let mut credentials = Vec::with_capacity(old_keys.len());
        for old in &old_keys {
            let new = old.rekey(&to);
            self.retract(d, old);
            self.publish(d, &new)?;
            credentials.push(new);
        }
        Ok(Outcome::Renamed { from, to, credentials })
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    pub(crate) fn remove(&self, d: &mut Draft<'_>, r: &RemoveRequest) -> Result<Outcome, EngineError> {
        let wallet = d.dir.require_email(&r.recipient_email)?;
        let slug = wallet.slug.clone();

        let targets: Vec<AchievementId> = if r.remove_profile {
            wallet.credentials.keys().cloned().collect()
        } else {
            let unique: BTreeSet<&AchievementId> = r.achievements.iter().collect();
            if let Some(absent) = unique.iter().find(|a| !wallet.credentials.contains_key(**a)) {
                return Err(EngineError::NotFound(format!("credential {slug}/{absent}")));
            }
            unique.into_iter().cloned().collect()
        };

        let mut credentials = Vec::with_capacity(targets.len());
        for ach in &targets {
            let key = CredentialKey::new(slug.clone(), ach.clone());
            d.status.retire(&key, d.now)?;
            self.retract(d, &key);
            credentials.push(key);
        }
        if r.remove_profile {
            d.dir.remove_wallet(&slug)?;
        } else if let Some(w) = d.dir.get_mut(&slug) {
            for ach in &targets {
                w.credentials.remove(ach);
            }
        }
        Ok(Outcome::Removed {
            wallet: slug,
            credentials,
            wallet_removed: r.remove_profile,
        })
    }

    // -----------------------------------------------------------------------
    // Revoke
    // -----------------------------------------------------------------------

    pub(crate) fn revoke(&self, d: &mut Draft<'_>, r: &RevokeRequest) -> Result<Outcome, EngineError> {
        let key = match r.target()? {
            RevokeTarget::Key(key) => key,
            RevokeTarget::Owner(email, achievement) => d.dir.require_email(&email)?.key(&achievement),
        };
        let revoke = !r.unrevoke;
        let record = d.dir.credential_mut(&key).ok_or_else(|| missing(&key))?;
        if record.revoked == revoke {
            return Ok(Outcome::Unchanged {
                wallet: None,
                credential: Some(key),
                reason: if revoke { "already revoked" } else { "not revoked" }.into(),
            });
        }
        record.revoked = revoke;
        let index = record.status_list_index;
        d.status.set_revoked(&key, revoke, d.now)?;
        Ok(if revoke {
            Outcome::Revoked { credential: key, status_list_index: index }
        } else {
            Outcome::Restored { credential: key, status_list_index: index }
        })
    }
}
