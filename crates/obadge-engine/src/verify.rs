//! # Artifact Verification
//!
//! Checks a credential handed over as `credential.json`, a baked SVG or a
//! baked PNG. Verification is read-only and never takes the workspace lock.
//!
//! Checks run in a fixed order and the first failure decides the verdict:
//!
//! 1. parse (JSON object claiming `VerifiableCredential`) → `malformed`
//! 2. proof against the issuer key → `signature-invalid`
//! 3. revocation bit in the status list, when one is available → `revoked`
//! 4. `validFrom` in the future → `not-yet-valid`
//! 5. `validUntil` in the past → `expired`
//!
//! ## Security Invariant
//!
//! A status list is only consulted after its own proof verifies against the
//! same issuer key. An unverifiable list is treated as absent, and the
//! report says the revocation check did not run.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use obadge_core::fsio::read_bytes_opt;
use obadge_core::Timestamp;
use obadge_crypto::Ed25519PublicKey;
use obadge_vc::{verify_document, CredentialEnvelope, StatusListCredential, VcError};

use crate::error::EngineError;

/// Outcome of verifying one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// Every check passed.
    Valid,
    /// `validUntil` has passed.
    Expired,
    /// `validFrom` lies in the future.
    NotYetValid,
    /// The status bit is set.
    Revoked,
    /// The proof is missing, unsupported or does not verify.
    SignatureInvalid,
    /// Not a credential.
    Malformed,
}

impl Verdict {
    /// Whether the credential is acceptable.
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    /// The verdict as printed.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::NotYetValid => "not-yet-valid",
            Self::Revoked => "revoked",
            Self::SignatureInvalid => "signature-invalid",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What verification found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// The verdict.
    pub verdict: Verdict,
    /// Credential `id`, when it could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    /// Subject id (`mailto:` URI), when it could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Status list index, when the credential has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_index: Option<u64>,
    /// Whether the revocation bit was actually read.
    pub status_checked: bool,
    /// Verification method named by the proof.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<String>,
    /// Why the verdict is negative.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl VerificationReport {
    fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            credential_id: None,
            subject: None,
            status_index: None,
            status_checked: false,
            verification_method: None,
            detail: None,
        }
    }

    fn fail(mut self, verdict: Verdict, detail: impl Into<String>) -> Self {
        self.verdict = verdict;
        self.detail = Some(detail.into());
        self
    }
}

fn verdict_for(e: &VcError) -> Verdict {
    match e {
        VcError::MissingProof
        | VcError::MalformedProof(_)
        | VcError::UnsupportedProof(_)
        | VcError::Crypto(_) => Verdict::SignatureInvalid,
        VcError::Malformed(_) | VcError::Json(_) | VcError::Canonicalization(_) => Verdict::Malformed,
    }
}

/// The credential document carried by `input`: the bytes themselves when
/// they are JSON, else the payload baked into an SVG or PNG.
pub fn credential_bytes(input: &[u8]) -> Result<Vec<u8>, obadge_bake::BakeError> {
    let trimmed = input.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(input);
    if trimmed.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
        return Ok(trimmed.to_vec());
    }
    obadge_bake::extract(input)
}

/// Verify `input` against the issuer key, consulting `status_list` for the
/// revocation bit when given.
pub fn verify_artifact(
    input: &[u8],
    key: &Ed25519PublicKey,
    status_list: Option<&StatusListCredential>,
    now: Timestamp,
) -> VerificationReport {
    let report = VerificationReport::new(Verdict::Valid);
    let bytes = match credential_bytes(input) {
        Ok(bytes) => bytes,
        Err(e) => return report.fail(Verdict::Malformed, e.to_string()),
    };
    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => return report.fail(Verdict::Malformed, format!("not JSON: {e}")),
    };
    verify_value(&value, key, status_list, now)
}

/// [`verify_artifact`] for an already parsed document.
pub fn verify_value(
    value: &Value,
    key: &Ed25519PublicKey,
    status_list: Option<&StatusListCredential>,
    now: Timestamp,
) -> VerificationReport {
    let mut report = VerificationReport::new(Verdict::Valid);
    let envelope = match CredentialEnvelope::from_value(value) {
        Ok(env) => env,
        Err(e) => return report.fail(verdict_for(&e), e.to_string()),
    };
    report.credential_id = envelope.id.clone();
    report.subject = envelope
        .credential_subject
        .as_ref()
        .and_then(|s| s.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let index = match envelope.credential_status.as_ref().map(|s| s.index()).transpose() {
        Ok(index) => index,
        Err(e) => return report.fail(Verdict::Malformed, e.to_string()),
    };
    report.status_index = index;

    match verify_document(value, key) {
        Ok(method) => report.verification_method = Some(method),
        Err(e) => return report.fail(verdict_for(&e), e.to_string()),
    }

    if let (Some(index), Some(list), Some(entry)) = (index, status_list, &envelope.credential_status) {
        if entry.status_list_credential != list.id {
            tracing::debug!(
                wanted = %entry.status_list_credential,
                have = %list.id,
                "credential points at another status list, revocation not checked"
            );
        } else {
            match obadge_status::status_bit(list, index) {
                Ok(bit) => {
                    report.status_checked = true;
                    if bit {
                        return report.fail(Verdict::Revoked, format!("status bit {index} is set"));
                    }
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "status bit unreadable, revocation not checked");
                }
            }
        }
    }

    if let Some(from) = envelope.valid_from {
        if from > now {
            return report.fail(Verdict::NotYetValid, format!("valid from {from}"));
        }
    }
    if let Some(until) = envelope.valid_until {
        if until <= now {
            return report.fail(Verdict::Expired, format!("expired at {until}"));
        }
    }
    report
}

/// Load the local status list at `path` if it exists and its proof verifies
/// against `key`.
pub fn load_status_list(path: &Path, key: &Ed25519PublicKey) -> Result<Option<StatusListCredential>, EngineError> {
    let Some(bytes) = read_bytes_opt(path)? else {
        tracing::debug!(path = %path.display(), "no local status list");
        return Ok(None);
    };
    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "status list is not JSON, ignored");
            return Ok(None);
        }
    };
    if let Err(e) = verify_document(&value, key) {
        tracing::warn!(path = %path.display(), error = %e, "status list proof does not verify, ignored");
        return Ok(None);
    }
    match StatusListCredential::from_value(&value) {
        Ok(list) => Ok(Some(list)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "status list unreadable, ignored");
            Ok(None)
        }
    }
}
