//! # Data Integrity Proofs (`eddsa-jcs-2022`)
//!
//! Every document the engine publishes (credentials and the status list
//! credential) is secured with an embedded `DataIntegrityProof`.
//!
//! ## Signing
//!
//! 1. Remove any existing `proof` from the document.
//! 2. Build the proof options `{type, cryptosuite, verificationMethod,
//!    created, proofPurpose}` and, for hashing only, give them the
//!    document's `@context`.
//! 3. Hash `JCS(proof options)` and `JCS(document)` with SHA-256 and sign the
//!    64-byte concatenation (proof options first).
//! 4. Embed the options plus `proofValue` (multibase base58btc).
//!
//! ## Verification
//!
//! Works on the raw JSON value, never on a re-serialized typed struct, so a
//! document carrying members this crate does not model still verifies.
//! The proof options are the embedded proof minus `proofValue`, with the
//! document `@context` added when the proof does not carry its own.
//!
//! ## Security Invariant
//!
//! Signing and verification both pass through [`CanonicalBytes`] and
//! [`SigningInput`]; there is no code path that hashes a non-canonical
//! serialization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use obadge_core::{CanonicalBytes, Timestamp};
use obadge_crypto::multikey::{decode_proof_value, encode_proof_value};
use obadge_crypto::{Ed25519PublicKey, KeyProvider, SigningInput};

use crate::error::VcError;

/// Proof type name.
pub const PROOF_TYPE: &str = "DataIntegrityProof";
/// Cryptosuite identifier.
pub const CRYPTOSUITE: &str = "eddsa-jcs-2022";

/// The purpose of a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProofPurpose {
    /// The issuer asserts the claims in the document.
    AssertionMethod,
    /// Authentication of the holder.
    Authentication,
}

/// An embedded `DataIntegrityProof`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataIntegrityProof {
    /// Always `DataIntegrityProof`.
    #[serde(rename = "type")]
    pub proof_type: String,
    /// Always `eddsa-jcs-2022`.
    pub cryptosuite: String,
    /// The key that produced the signature, `<controller>#<key-id>`.
    pub verification_method: String,
    /// When the proof was created.
    pub created: Timestamp,
    /// Why the proof was made.
    pub proof_purpose: ProofPurpose,
    /// Multibase base58btc Ed25519 signature.
    pub proof_value: String,
}

impl DataIntegrityProof {
    /// Sign `document` (any existing `proof` member is ignored) and return
    /// the proof to embed.
    ///
    /// Deterministic for identical document, `created` and key.
    pub fn create(
        document: &Value,
        provider: &dyn KeyProvider,
        created: Timestamp,
    ) -> Result<Self, VcError> {
        let unsecured = strip_proof(document)?;
        let mut options = Map::new();
        options.insert("type".into(), PROOF_TYPE.into());
        options.insert("cryptosuite".into(), CRYPTOSUITE.into());
        options.insert(
            "verificationMethod".into(),
            provider.verification_method().into(),
        );
        options.insert("created".into(), created.to_iso8601().into());
        options.insert("proofPurpose".into(), "assertionMethod".into());

        let input = signing_input(options, &unsecured)?;
        let signature = provider.sign(&input)?;
        tracing::trace!(
            method = provider.verification_method(),
            provider = provider.provider_name(),
            "document signed"
        );
        Ok(Self {
            proof_type: PROOF_TYPE.to_string(),
            cryptosuite: CRYPTOSUITE.to_string(),
            verification_method: provider.verification_method().to_string(),
            created,
            proof_purpose: ProofPurpose::AssertionMethod,
            proof_value: encode_proof_value(&signature),
        })
    }
}

/// Sign a serializable document and return it as JSON with `proof` embedded.
pub fn secure(
    document: &impl Serialize,
    provider: &dyn KeyProvider,
    created: Timestamp,
) -> Result<Value, VcError> {
    let mut value = serde_json::to_value(document)?;
    let proof = DataIntegrityProof::create(&value, provider, created)?;
    match value.as_object_mut() {
        Some(obj) => {
            obj.insert("proof".into(), serde_json::to_value(proof)?);
            Ok(value)
        }
        None => Err(VcError::Malformed("document is not a JSON object".into())),
    }
}

/// Verify the embedded proof of a raw JSON document against `key`.
///
/// Returns the verification method named by the proof on success.
pub fn verify_document(document: &Value, key: &Ed25519PublicKey) -> Result<String, VcError> {
    let obj = document
        .as_object()
        .ok_or_else(|| VcError::Malformed("document is not a JSON object".into()))?;
    let proof = match obj.get("proof") {
        Some(Value::Object(p)) => p.clone(),
        Some(Value::Array(_)) => {
            return Err(VcError::UnsupportedProof("proof sets are not supported".into()))
        }
        Some(_) => return Err(VcError::MalformedProof("proof is not an object".into())),
        None => return Err(VcError::MissingProof),
    };

    let field = |name: &str| -> Result<&str, VcError> {
        proof
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| VcError::MalformedProof(format!("missing string member {name}")))
    };
    let proof_type = field("type")?;
    let suite = field("cryptosuite")?;
    if proof_type != PROOF_TYPE || suite != CRYPTOSUITE {
        return Err(VcError::UnsupportedProof(format!("{proof_type}/{suite}")));
    }
    let method = field("verificationMethod")?.to_string();
    let signature = decode_proof_value(field("proofValue")?)
        .map_err(|e| VcError::MalformedProof(e.to_string()))?;

    let mut options = proof;
    options.remove("proofValue");
    let unsecured = strip_proof(document)?;
    let input = signing_input(options, &unsecured)?;
    obadge_crypto::verify(&input, &signature, key)?;
    Ok(method)
}

/// The document without its `proof` member.
fn strip_proof(document: &Value) -> Result<Value, VcError> {
    let mut obj = document
        .as_object()
        .cloned()
        .ok_or_else(|| VcError::Malformed("document is not a JSON object".into()))?;
    obj.remove("proof");
    Ok(Value::Object(obj))
}

fn signing_input(mut options: Map<String, Value>, unsecured: &Value) -> Result<SigningInput, VcError> {
    if !options.contains_key("@context") {
        if let Some(ctx) = unsecured.get("@context") {
            options.insert("@context".into(), ctx.clone());
        }
    }
    let options = CanonicalBytes::from_value(Value::Object(options))?;
    let document = CanonicalBytes::from_value(unsecured.clone())?;
    Ok(SigningInput::new(&options, &document))
}
