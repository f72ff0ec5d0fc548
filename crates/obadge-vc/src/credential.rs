//! # OpenBadgeCredential
//!
//! The typed shape of an OpenBadges 3.0 credential as this engine issues it.
//!
//! ```json
//! {
//!   "@context": ["https://www.w3.org/ns/credentials/v2",
//!                "https://purl.imsglobal.org/spec/ob/v3p0/context-3.0.3.json"],
//!   "id": "https://credentials.cognipilot.org/profile/jane-doe/tsc-member-2026",
//!   "type": ["VerifiableCredential", "OpenBadgeCredential"],
//!   "issuer": {"type": "Profile", "id": "did:web:...", "name": "...", "url": "..."},
//!   "validFrom": "2026-01-01T00:00:00Z",
//!   "credentialSubject": {"id": "mailto:jane@example.com", "type": ["AchievementSubject"],
//!                         "name": "Jane Doe", "achievement": {...}},
//!   "credentialStatus": {"type": "BitstringStatusListEntry", ...},
//!   "proof": {...}
//! }
//! ```
//!
//! The typed struct is only used for documents this engine builds. Documents
//! received for verification are handled as raw JSON (see
//! [`crate::proof::verify_document`] and [`CredentialEnvelope`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use obadge_core::{AchievementId, CredentialKey, Email, Slug, Timestamp};
use obadge_crypto::KeyProvider;

use crate::error::VcError;
use crate::proof::{secure, DataIntegrityProof};

/// W3C VC 2.0 base context.
pub const CREDENTIALS_V2_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";
/// OpenBadges 3.0 context.
pub const OB_V3_CONTEXT: &str = "https://purl.imsglobal.org/spec/ob/v3p0/context-3.0.3.json";

/// Build the public URL (and credential `id`) of a credential.
pub fn credential_url(base_url: &str, key: &CredentialKey) -> String {
    format!(
        "{}/profile/{}/{}",
        base_url.trim_end_matches('/'),
        key.slug,
        key.achievement
    )
}

// ---------------------------------------------------------------------------
// Issuer and achievement
// ---------------------------------------------------------------------------

/// The issuing organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerProfile {
    /// Always `Profile`.
    #[serde(rename = "type")]
    pub profile_type: String,
    /// Issuer identifier, e.g. `did:web:credentials.cognipilot.org`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Homepage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl IssuerProfile {
    /// Build a `Profile` issuer.
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: Option<String>) -> Self {
        Self {
            profile_type: "Profile".to_string(),
            id: id.into(),
            name: name.into(),
            url,
        }
    }
}

/// An achievement definition from the catalog (`achievements/<id>.json`).
///
/// Only the members copied into credentials are modelled; anything else in
/// the catalog file is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementTemplate {
    /// Achievement URI.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// OpenBadges achievement type, e.g. `Membership`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement_type: Option<String>,
    /// Image, either a URL string or an `Image` object with an `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Value>,
    /// Criteria object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Value>,
}

impl AchievementTemplate {
    /// The last path segment of the image URL, used to locate the badge
    /// template on disk (`tsc-member.svg`).
    pub fn image_file_name(&self) -> Option<&str> {
        let url = match self.image.as_ref()? {
            Value::String(s) => s.as_str(),
            Value::Object(o) => o.get("id")?.as_str()?,
            _ => return None,
        };
        url.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

/// The achievement as embedded in a credential subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    /// Achievement URI.
    pub id: String,
    /// Always `Achievement`.
    #[serde(rename = "type")]
    pub achievement_kind: String,
    /// OpenBadges achievement type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement_type: Option<String>,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Value>,
    /// Criteria.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Value>,
}

impl From<&AchievementTemplate> for Achievement {
    fn from(t: &AchievementTemplate) -> Self {
        Self {
            id: t.id.clone(),
            achievement_kind: "Achievement".to_string(),
            achievement_type: t.achievement_type.clone(),
            name: t.name.clone(),
            description: t.description.clone(),
            image: t.image.clone(),
            criteria: t.criteria.clone(),
        }
    }
}

/// The recipient and what they achieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementSubject {
    /// `mailto:` URI of the recipient.
    pub id: String,
    /// Always `["AchievementSubject"]`.
    #[serde(rename = "type")]
    pub subject_type: Vec<String>,
    /// Recipient display name.
    pub name: String,
    /// The achievement.
    pub achievement: Achievement,
}

// ---------------------------------------------------------------------------
// Status entry
// ---------------------------------------------------------------------------

/// A `BitstringStatusListEntry` pointing into the global revocation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    /// `<status list url>#<index>`.
    pub id: String,
    /// Always `BitstringStatusListEntry`.
    #[serde(rename = "type")]
    pub entry_type: String,
    /// Always `revocation`.
    pub status_purpose: String,
    /// The bit index, as a decimal string.
    pub status_list_index: String,
    /// URL of the status list credential.
    pub status_list_credential: String,
}

impl StatusEntry {
    /// Entry for bit `index` of the list at `status_list_url`.
    pub fn revocation(status_list_url: &str, index: u64) -> Self {
        Self {
            id: format!("{status_list_url}#{index}"),
            entry_type: "BitstringStatusListEntry".to_string(),
            status_purpose: "revocation".to_string(),
            status_list_index: index.to_string(),
            status_list_credential: status_list_url.to_string(),
        }
    }

    /// Parse `statusListIndex`.
    pub fn index(&self) -> Result<u64, VcError> {
        self.status_list_index.trim().parse().map_err(|_| {
            VcError::Malformed(format!(
                "statusListIndex {:?} is not a non-negative integer",
                self.status_list_index
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// OpenBadgeCredential
// ---------------------------------------------------------------------------

/// Everything needed to build a credential for one wallet and achievement.
#[derive(Debug, Clone)]
pub struct CredentialParams<'a> {
    /// Public base URL of the deployment.
    pub base_url: &'a str,
    /// Issuer profile.
    pub issuer: &'a IssuerProfile,
    /// Wallet slug.
    pub slug: &'a Slug,
    /// Achievement id (catalog file stem).
    pub achievement_id: &'a AchievementId,
    /// Catalog entry.
    pub achievement: &'a AchievementTemplate,
    /// Recipient email.
    pub email: &'a Email,
    /// Recipient display name.
    pub recipient_name: &'a str,
    /// Start of validity.
    pub valid_from: Timestamp,
    /// Optional end of validity.
    pub valid_until: Option<Timestamp>,
    /// Status list entry.
    pub status: StatusEntry,
}

/// An OpenBadges 3.0 credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenBadgeCredential {
    /// JSON-LD contexts.
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    /// Credential URL.
    pub id: String,
    /// `["VerifiableCredential", "OpenBadgeCredential"]`.
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    /// Issuer.
    pub issuer: IssuerProfile,
    /// Start of validity.
    pub valid_from: Timestamp,
    /// End of validity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<Timestamp>,
    /// Recipient and achievement.
    pub credential_subject: AchievementSubject,
    /// Revocation status pointer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<StatusEntry>,
    /// Embedded proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<DataIntegrityProof>,
}

impl OpenBadgeCredential {
    /// Build an unsigned credential.
    pub fn build(p: CredentialParams<'_>) -> Self {
        let key = CredentialKey::new(p.slug.clone(), p.achievement_id.clone());
        Self {
            context: vec![CREDENTIALS_V2_CONTEXT.to_string(), OB_V3_CONTEXT.to_string()],
            id: credential_url(p.base_url, &key),
            credential_type: vec![
                "VerifiableCredential".to_string(),
                "OpenBadgeCredential".to_string(),
            ],
            issuer: p.issuer.clone(),
            valid_from: p.valid_from,
            valid_until: p.valid_until,
            credential_subject: AchievementSubject {
                id: p.email.to_mailto(),
                subject_type: vec!["AchievementSubject".to_string()],
                name: p.recipient_name.to_string(),
                achievement: Achievement::from(p.achievement),
            },
            credential_status: Some(p.status),
            proof: None,
        }
    }

    /// Attach a fresh proof, replacing any existing one.
    pub fn sign(mut self, provider: &dyn KeyProvider, created: Timestamp) -> Result<Self, VcError> {
        self.proof = None;
        let signed = secure(&self, provider, created)?;
        Ok(serde_json::from_value(signed)?)
    }

    /// Status list index from `credentialStatus`, if present.
    pub fn status_index(&self) -> Result<Option<u64>, VcError> {
        self.credential_status.as_ref().map(StatusEntry::index).transpose()
    }

    /// Pretty JSON bytes with a trailing newline, the published form.
    pub fn to_pretty_bytes(&self) -> Result<Vec<u8>, VcError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

// ---------------------------------------------------------------------------
// Envelope view for verification
// ---------------------------------------------------------------------------

/// The members a verifier needs from any received credential, parsed
/// leniently so that unexpected extra members never break verification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEnvelope {
    /// Credential id.
    #[serde(default)]
    pub id: Option<String>,
    /// Credential types (string or array).
    #[serde(default, rename = "type")]
    pub credential_type: Option<Value>,
    /// Start of validity.
    #[serde(default)]
    pub valid_from: Option<Timestamp>,
    /// End of validity.
    #[serde(default)]
    pub valid_until: Option<Timestamp>,
    /// Status pointer.
    #[serde(default)]
    pub credential_status: Option<StatusEntry>,
    /// Subject, left unparsed.
    #[serde(default)]
    pub credential_subject: Option<Value>,
}

impl CredentialEnvelope {
    /// Parse from raw JSON; requires an object that claims the
    /// `VerifiableCredential` type.
    pub fn from_value(value: &Value) -> Result<Self, VcError> {
        if !value.is_object() {
            return Err(VcError::Malformed("document is not a JSON object".into()));
        }
        let env: Self = serde_json::from_value(value.clone())
            .map_err(|e| VcError::Malformed(e.to_string()))?;
        let is_vc = match &env.credential_type {
            Some(Value::String(s)) => s == "VerifiableCredential",
            Some(Value::Array(a)) => a.iter().any(|t| t == "VerifiableCredential"),
            _ => false,
        };
        if !is_vc {
            return Err(VcError::Malformed("type does not include VerifiableCredential".into()));
        }
        Ok(env)
    }
}
