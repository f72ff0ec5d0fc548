//! # BitstringStatusListCredential
//!
//! The signed document published at the status list URL. Its subject carries
//! the `encodedList` (gzip then base64url, see `obadge-status`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use obadge_core::Timestamp;
use obadge_crypto::KeyProvider;

use crate::credential::CREDENTIALS_V2_CONTEXT;
use crate::error::VcError;
use crate::proof::{secure, DataIntegrityProof};

/// Status list vocabulary context.
pub const STATUS_LIST_CONTEXT: &str = "https://w3id.org/vc/status-list/2021/v1";

/// Subject of a status list credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusListSubject {
    /// `<status list url>#list`.
    pub id: String,
    /// Always `BitstringStatusList`.
    #[serde(rename = "type")]
    pub subject_type: String,
    /// Always `revocation`.
    pub status_purpose: String,
    /// gzip + base64url (unpadded) bitstring.
    pub encoded_list: String,
}

/// The published status list credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusListCredential {
    /// JSON-LD contexts.
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    /// The status list URL.
    pub id: String,
    /// `["VerifiableCredential", "BitstringStatusListCredential"]`.
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    /// Issuer identifier.
    pub issuer: String,
    /// When this rendering was produced.
    pub valid_from: Timestamp,
    /// The list.
    pub credential_subject: StatusListSubject,
    /// Embedded proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<DataIntegrityProof>,
}

impl StatusListCredential {
    /// Build an unsigned status list credential.
    pub fn build(list_url: &str, issuer_id: &str, encoded_list: String, valid_from: Timestamp) -> Self {
        Self {
            context: vec![
                CREDENTIALS_V2_CONTEXT.to_string(),
                STATUS_LIST_CONTEXT.to_string(),
            ],
            id: list_url.to_string(),
            credential_type: vec![
                "VerifiableCredential".to_string(),
                "BitstringStatusListCredential".to_string(),
            ],
            issuer: issuer_id.to_string(),
            valid_from,
            credential_subject: StatusListSubject {
                id: format!("{list_url}#list"),
                subject_type: "BitstringStatusList".to_string(),
                status_purpose: "revocation".to_string(),
                encoded_list,
            },
            proof: None,
        }
    }

    /// Attach a fresh proof.
    pub fn sign(mut self, provider: &dyn KeyProvider, created: Timestamp) -> Result<Self, VcError> {
        self.proof = None;
        Ok(serde_json::from_value(secure(&self, provider, created)?)?)
    }

    /// Parse a received status list credential.
    pub fn from_value(value: &Value) -> Result<Self, VcError> {
        let cred: Self = serde_json::from_value(value.clone())
            .map_err(|e| VcError::Malformed(format!("status list credential: {e}")))?;
        if cred.credential_subject.subject_type != "BitstringStatusList" {
            return Err(VcError::Malformed(format!(
                "unexpected status list subject type {}",
                cred.credential_subject.subject_type
            )));
        }
        Ok(cred)
    }

    /// Pretty JSON bytes with a trailing newline.
    pub fn to_pretty_bytes(&self) -> Result<Vec<u8>, VcError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
