//! # Mutation Requests
//!
//! The five request kinds form a closed enum; the dispatcher matches on it
//! exhaustively. Requests arrive as JSON objects discriminated by
//! `request_type` (default `issue`):
//!
//! | `request_type` | Variant |
//! |---|---|
//! | `issue` / `create` | [`Request::Create`] |
//! | `update` | [`Request::Update`] |
//! | `rename_wallet` / `rename` | [`Request::Rename`] |
//! | `remove` | [`Request::Remove`] |
//! | `revoke` | [`Request::Revoke`] |
//!
//! Unknown members (issue-form leftovers, a previous `receipt`) are ignored.
//!
//! ## Replay identity
//!
//! [`Submission::digest`] is the SHA-256 of the JCS form of the *typed*
//! request, so formatting and ignored members never change it. An optional
//! `request_id` distinguishes two deliberate submissions with otherwise
//! identical content; request files default it to their file name.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use obadge_core::{sha256_digest, AchievementId, CanonicalBytes, ContentDigest, CredentialKey, Email, Timestamp};

use crate::error::EngineError;

/// Requested revocation state of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialState {
    /// Not revoked.
    Active,
    /// Revoked.
    Revoked,
}

impl CredentialState {
    /// Whether this is [`CredentialState::Revoked`].
    pub fn is_revoked(self) -> bool {
        self == Self::Revoked
    }
}

/// Accept RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
fn parse_when(s: &str) -> Result<Timestamp, EngineError> {
    let s = s.trim();
    if s.len() == 10 && s.as_bytes()[4] == b'-' && s.as_bytes()[7] == b'-' {
        return Ok(Timestamp::parse(&format!("{s}T00:00:00Z"))?);
    }
    Ok(Timestamp::parse(s)?)
}

fn de_when<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_when(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Absent → `None` (keep), `null` or `""` → `Some(None)` (clear),
/// a date → `Some(Some(ts))`.
fn de_when_patch<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<Timestamp>>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(Some(None)),
        Some(s) if s.trim().is_empty() => Ok(Some(None)),
        Some(s) => parse_when(&s).map(|t| Some(Some(t))).map_err(serde::de::Error::custom),
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        Err(EngineError::Validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

pub(crate) fn window(from: Option<Timestamp>, until: Option<Timestamp>) -> Result<(), EngineError> {
    match (from, until) {
        (Some(f), Some(u)) if u <= f => Err(EngineError::Validation(format!(
            "valid_until {u} is not after valid_from {f}"
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Issue a credential, creating the wallet on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Recipient display name.
    pub recipient_name: String,
    /// Recipient e-mail.
    pub recipient_email: Email,
    /// Achievement to issue.
    pub achievement: AchievementId,
    /// Start of validity; defaults to the time of issuance.
    #[serde(default, deserialize_with = "de_when", skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<Timestamp>,
    /// End of validity.
    #[serde(default, deserialize_with = "de_when", skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<Timestamp>,
    /// Issue already revoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CredentialState>,
    /// Custom slug for a new wallet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_slug: Option<String>,
    /// Random slug for a new wallet.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub anonymize_slug: bool,
}

/// Change a credential's fields, possibly moving it to another e-mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// E-mail of the wallet currently holding the credential.
    pub old_email: Email,
    /// E-mail the wallet should have afterwards.
    pub recipient_email: Email,
    /// Achievement of the credential.
    pub achievement: AchievementId,
    /// New recipient name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    /// New start of validity.
    #[serde(default, deserialize_with = "de_when", skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<Timestamp>,
    /// New end of validity; `null` clears it.
    #[serde(default, deserialize_with = "de_when_patch", skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<Option<Timestamp>>,
    /// New revocation state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CredentialState>,
}

/// Give a wallet a new slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRequest {
    /// Wallet owner.
    pub recipient_email: Email,
    /// Requested slug (normalized).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_wallet_slug: Option<String>,
    /// Pick a random slug instead.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub anonymize_slug: bool,
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
}

/// Delete credentials or a whole wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRequest {
    /// Wallet owner.
    pub recipient_email: Email,
    /// Delete the wallet and every credential in it.
    #[serde(default)]
    pub remove_profile: bool,
    /// Achievements to delete when not removing the profile.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub achievements: Vec<AchievementId>,
}

/// Set or clear a credential's revocation bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeRequest {
    /// `wallet_slug/achievement_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<CredentialKey>,
    /// Owner e-mail, with `achievement`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<Email>,
    /// Achievement, with `recipient_email`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement: Option<AchievementId>,
    /// Restore instead of revoke.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unrevoke: bool,
}

/// Which credential a revoke request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeTarget {
    /// By composite id.
    Key(CredentialKey),
    /// By owner and achievement.
    Owner(Email, AchievementId),
}

impl RevokeRequest {
    /// Revoke (or restore) by composite id.
    pub fn by_key(key: CredentialKey, unrevoke: bool) -> Self {
        Self {
            credential_id: Some(key),
            recipient_email: None,
            achievement: None,
            unrevoke,
        }
    }

    /// Revoke (or restore) by owner and achievement.
    pub fn by_owner(email: Email, achievement: AchievementId, unrevoke: bool) -> Self {
        Self {
            credential_id: None,
            recipient_email: Some(email),
            achievement: Some(achievement),
            unrevoke,
        }
    }

    /// The target, or a validation error if it is ambiguous or incomplete.
    pub fn target(&self) -> Result<RevokeTarget, EngineError> {
        match (&self.credential_id, &self.recipient_email, &self.achievement) {
            (Some(key), None, None) => Ok(RevokeTarget::Key(key.clone())),
            (None, Some(e), Some(a)) => Ok(RevokeTarget::Owner(e.clone(), a.clone())),
            (Some(_), _, _) => Err(EngineError::Validation(
                "give either credential_id or recipient_email + achievement, not both".into(),
            )),
            _ => Err(EngineError::Validation(
                "revoke needs credential_id or recipient_email + achievement".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request_type", rename_all = "snake_case")]
pub enum Request {
    /// Issue.
    #[serde(rename = "issue", alias = "create")]
    Create(CreateRequest),
    /// Update.
    Update(UpdateRequest),
    /// Rename.
    #[serde(rename = "rename_wallet", alias = "rename")]
    Rename(RenameRequest),
    /// Remove.
    Remove(RemoveRequest),
    /// Revoke or restore.
    Revoke(RevokeRequest),
}

/// A request plus its optional submission id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    /// Distinguishes deliberate resubmissions of identical content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// The request.
    #[serde(flatten)]
    pub request: Request,
}

impl Request {
    /// `request_type` as it appears in request files.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Create(_) => "issue",
            Self::Update(_) => "update",
            Self::Rename(_) => "rename_wallet",
            Self::Remove(_) => "remove",
            Self::Revoke(_) => "revoke",
        }
    }

    /// Structural checks that need no state: non-empty names, a coherent
    /// validity window, exactly one slug choice, a complete target.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            Self::Create(r) => {
                non_empty("recipient_name", &r.recipient_name)?;
                if r.anonymize_slug && r.wallet_slug.is_some() {
                    return Err(EngineError::Validation(
                        "wallet_slug and anonymize_slug are mutually exclusive".into(),
                    ));
                }
                window(r.valid_from, r.valid_until)
            }
            Self::Update(r) => {
                if let Some(name) = &r.recipient_name {
                    non_empty("recipient_name", name)?;
                }
                window(r.valid_from, r.valid_until.flatten())
            }
            Self::Rename(r) => {
                if let Some(name) = &r.recipient_name {
                    non_empty("recipient_name", name)?;
                }
                match (&r.new_wallet_slug, r.anonymize_slug) {
                    (Some(_), false) | (None, true) => Ok(()),
                    (Some(_), true) => Err(EngineError::Validation(
                        "new_wallet_slug and anonymize_slug are mutually exclusive".into(),
                    )),
                    (None, false) => Err(EngineError::Validation(
                        "rename needs new_wallet_slug or anonymize_slug".into(),
                    )),
                }
            }
            Self::Remove(r) => {
                if !r.remove_profile && r.achievements.is_empty() {
                    return Err(EngineError::Validation(
                        "remove needs remove_profile or a list of achievements".into(),
                    ));
                }
                Ok(())
            }
            Self::Revoke(r) => r.target().map(|_| ()),
        }
    }
}

impl Submission {
    /// A submission without an id.
    pub fn new(request: Request) -> Self {
        Self {
            request_id: None,
            request,
        }
    }

    /// Attach a submission id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Parse a request object. `request_type` defaults to `issue`; a
    /// `request_id` member, if present, becomes the submission id.
    pub fn from_value(value: &Value) -> Result<Self, EngineError> {
        let mut obj = value
            .as_object()
            .cloned()
            .ok_or_else(|| EngineError::Validation("request must be a JSON object".into()))?;
        obj.remove("receipt");
        let request_id = match obj.remove("request_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };
        obj.entry("request_type")
            .or_insert_with(|| Value::String("issue".into()));
        let request: Request = serde_json::from_value(Value::Object(obj))
            .map_err(|e| EngineError::Validation(format!("malformed request: {e}")))?;
        Ok(Self {
            request_id,
            request,
        })
    }

    /// SHA-256 of the canonical typed form.
    pub fn digest(&self) -> Result<ContentDigest, EngineError> {
        Ok(sha256_digest(&CanonicalBytes::new(self)?))
    }
}

impl From<Request> for Submission {
    fn from(request: Request) -> Self {
        Self::new(request)
    }
}
