//! # Request Outcomes and Reports

use std::path::PathBuf;

use serde::Serialize;

use obadge_core::{CredentialKey, Slug};

use crate::error::EngineError;

/// What an applied request did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// A credential was issued.
    Created {
        /// The new credential.
        credential: CredentialKey,
        /// Its status list index.
        status_list_index: u64,
        /// Whether the wallet was created for it.
        new_wallet: bool,
    },
    /// Credential fields or the wallet's e-mail changed.
    Updated {
        /// The wallet.
        wallet: Slug,
        /// Credentials that were re-signed.
        credentials: Vec<CredentialKey>,
        /// Whether the wallet moved to a new e-mail.
        email_changed: bool,
    },
    /// One wallet was merged into another.
    Merged {
        /// Retired source slug.
        from: Slug,
        /// Surviving destination slug.
        into: Slug,
        /// Credentials now held by the destination that were re-signed.
        credentials: Vec<CredentialKey>,
        /// Source credentials dropped in favour of the destination's copy.
        dropped: Vec<CredentialKey>,
    },
    /// A wallet got a new slug.
    Renamed {
        /// Retired slug.
        from: Slug,
        /// New slug.
        to: Slug,
        /// Credentials under their new ids.
        credentials: Vec<CredentialKey>,
    },
    /// Credentials (and possibly the wallet) were deleted.
    Removed {
        /// The wallet.
        wallet: Slug,
        /// Deleted credentials.
        credentials: Vec<CredentialKey>,
        /// Whether the whole wallet was removed.
        wallet_removed: bool,
    },
    /// A credential's revocation bit was set.
    Revoked {
        /// The credential.
        credential: CredentialKey,
        /// The bit.
        status_list_index: u64,
    },
    /// A credential's revocation bit was cleared.
    Restored {
        /// The credential.
        credential: CredentialKey,
        /// The bit.
        status_list_index: u64,
    },
    /// Nothing to do.
    Unchanged {
        /// Wallet concerned, if known.
        #[serde(skip_serializing_if = "Option::is_none")]
        wallet: Option<Slug>,
        /// Credential concerned, if known.
        #[serde(skip_serializing_if = "Option::is_none")]
        credential: Option<CredentialKey>,
        /// Why.
        reason: String,
    },
}

impl Outcome {
    /// Snake-case name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Merged { .. } => "merged",
            Self::Renamed { .. } => "renamed",
            Self::Removed { .. } => "removed",
            Self::Revoked { .. } => "revoked",
            Self::Restored { .. } => "restored",
            Self::Unchanged { .. } => "unchanged",
        }
    }

    /// Whether the request was a no-op.
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged { .. })
    }

    /// The wallet the request ended up affecting.
    pub fn wallet_slug(&self) -> Option<&Slug> {
        match self {
            Self::Created { credential, .. }
            | Self::Revoked { credential, .. }
            | Self::Restored { credential, .. } => Some(&credential.slug),
            Self::Updated { wallet, .. } | Self::Removed { wallet, .. } => Some(wallet),
            Self::Merged { into, .. } => Some(into),
            Self::Renamed { to, .. } => Some(to),
            Self::Unchanged { wallet, credential, .. } => {
                wallet.as_ref().or(credential.as_ref().map(|c| &c.slug))
            }
        }
    }

    /// The single credential the request concerned, when there is one.
    pub fn credential(&self) -> Option<&CredentialKey> {
        match self {
            Self::Created { credential, .. }
            | Self::Revoked { credential, .. }
            | Self::Restored { credential, .. } => Some(credential),
            Self::Unchanged { credential, .. } => credential.as_ref(),
            Self::Updated { credentials, .. }
            | Self::Merged { credentials, .. }
            | Self::Renamed { credentials, .. }
            | Self::Removed { credentials, .. } => match credentials.as_slice() {
                [only] => Some(only),
                _ => None,
            },
        }
    }
}

/// Where a request ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Parsed, not yet checked.
    Received,
    /// Structurally valid.
    Validated,
    /// Committed (or, in a dry run, would commit).
    Applied,
    /// Refused; nothing was written.
    Rejected,
}

/// One request of a batch.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Where the request came from: a file name, or `#<position>`.
    pub source: String,
    /// `Applied` or `Rejected`.
    pub state: RequestState,
    /// The result.
    pub result: Result<Outcome, EngineError>,
    /// Files written or deleted (or that would be, in a dry run).
    pub changes: Vec<PathBuf>,
}

/// Result of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// One entry per request, in order.
    pub entries: Vec<BatchEntry>,
    /// Whether nothing was written.
    pub dry_run: bool,
}

impl BatchReport {
    /// Entries that applied.
    pub fn applied(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| e.state == RequestState::Applied)
    }

    /// Entries that were rejected.
    pub fn rejected(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| e.state == RequestState::Rejected)
    }

    /// Whether every request applied.
    pub fn all_applied(&self) -> bool {
        self.rejected().next().is_none()
    }
}
