//! # Multikey Key Documents
//!
//! Ed25519 keys are stored and published as `Multikey` verification methods:
//! the raw key is prefixed with its multicodec header and encoded as
//! multibase base58btc (a leading `z`).
//!
//! | Key | Multicodec header |
//! |---|---|
//! | `ed25519-pub` | `0xed 0x01` |
//! | `ed25519-priv` | `0x80 0x26` |
//!
//! The private document holds both `publicKeyMultibase` and
//! `secretKeyMultibase`; the public document omits the secret and is what
//! the issuer profile advertises.

use std::path::Path;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use crate::error::CryptoError;

/// Multicodec header for an Ed25519 public key.
pub const ED25519_PUB_HEADER: [u8; 2] = [0xed, 0x01];
/// Multicodec header for an Ed25519 private key seed.
pub const ED25519_PRIV_HEADER: [u8; 2] = [0x80, 0x26];

/// Encode bytes as multibase base58btc.
pub fn encode_multibase(data: &[u8]) -> String {
    format!("z{}", bs58::encode(data).into_string())
}

/// Decode a multibase base58btc string. Other bases are rejected.
pub fn decode_multibase(value: &str) -> Result<Vec<u8>, CryptoError> {
    let body = value
        .strip_prefix('z')
        .ok_or_else(|| CryptoError::Multibase(format!("unsupported multibase prefix in {value:?}")))?;
    bs58::decode(body)
        .into_vec()
        .map_err(|e| CryptoError::Multibase(e.to_string()))
}

/// `publicKeyMultibase` for a public key.
pub fn encode_public_key(key: &Ed25519PublicKey) -> String {
    let mut bytes = ED25519_PUB_HEADER.to_vec();
    bytes.extend_from_slice(key.as_bytes());
    encode_multibase(&bytes)
}

/// Parse a `publicKeyMultibase` value.
pub fn decode_public_key(value: &str) -> Result<Ed25519PublicKey, CryptoError> {
    let bytes = decode_multibase(value)?;
    let raw = bytes
        .strip_prefix(&ED25519_PUB_HEADER)
        .ok_or_else(|| CryptoError::InvalidPublicKey("missing ed25519-pub multicodec header".into()))?;
    Ed25519PublicKey::from_slice(raw)
}

/// `secretKeyMultibase` for a key pair.
pub fn encode_secret_key(key: &Ed25519KeyPair) -> Zeroizing<String> {
    let mut bytes = Zeroizing::new(ED25519_PRIV_HEADER.to_vec());
    bytes.extend_from_slice(&key.seed()[..]);
    Zeroizing::new(encode_multibase(&bytes))
}

/// Parse a `secretKeyMultibase` value into a key pair.
pub fn decode_secret_key(value: &str) -> Result<Ed25519KeyPair, CryptoError> {
    let bytes = Zeroizing::new(decode_multibase(value)?);
    let raw = bytes
        .strip_prefix(&ED25519_PRIV_HEADER)
        .ok_or_else(|| CryptoError::InvalidSecretKey("missing ed25519-priv multicodec header".into()))?;
    let seed: Zeroizing<[u8; 32]> = Zeroizing::new(raw.try_into().map_err(|_| {
        CryptoError::InvalidSecretKey(format!("expected 32-byte seed, got {} bytes", raw.len()))
    })?);
    Ok(Ed25519KeyPair::from_seed(&seed))
}

/// A proof value: multibase base58btc of the 64 signature bytes.
pub fn encode_proof_value(sig: &Ed25519Signature) -> String {
    encode_multibase(sig.as_bytes())
}

/// Parse a `proofValue`.
pub fn decode_proof_value(value: &str) -> Result<Ed25519Signature, CryptoError> {
    Ed25519Signature::from_slice(&decode_multibase(value)?)
}

// ---------------------------------------------------------------------------
// Key documents
// ---------------------------------------------------------------------------

/// A `Multikey` verification method document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultikeyDocument {
    /// Verification method id, `<issuer>#<key-id>`.
    pub id: String,
    /// Always `Multikey`.
    #[serde(rename = "type")]
    pub key_type: String,
    /// The issuer that controls the key.
    pub controller: String,
    /// Multibase public key with the `ed25519-pub` header.
    pub public_key_multibase: String,
    /// Multibase seed with the `ed25519-priv` header. Present only in the
    /// private document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_multibase: Option<String>,
}

impl Drop for MultikeyDocument {
    fn drop(&mut self) {
        if let Some(secret) = self.secret_key_multibase.as_mut() {
            zeroize::Zeroize::zeroize(secret);
        }
    }
}

/// A freshly generated key pair with both of its documents.
#[derive(Debug)]
pub struct GeneratedMultikey {
    /// The document to publish.
    pub public: MultikeyDocument,
    /// The document to keep secret.
    pub private: MultikeyDocument,
}

impl MultikeyDocument {
    /// The public document for `key`, controlled by `controller`.
    pub fn public(key: &Ed25519PublicKey, controller: &str, key_id: &str) -> Self {
        Self {
            id: format!("{controller}#{key_id}"),
            key_type: "Multikey".to_string(),
            controller: controller.to_string(),
            public_key_multibase: encode_public_key(key),
            secret_key_multibase: None,
        }
    }

    /// Generate a new key pair and both of its documents.
    pub fn generate(controller: &str, key_id: &str) -> GeneratedMultikey {
        let kp = Ed25519KeyPair::generate();
        let public = Self::public(&kp.public_key(), controller, key_id);
        let mut private = public.clone();
        private.secret_key_multibase = Some(encode_secret_key(&kp).to_string());
        GeneratedMultikey { public, private }
    }

    /// Decode the public key.
    pub fn public_key(&self) -> Result<Ed25519PublicKey, CryptoError> {
        decode_public_key(&self.public_key_multibase)
    }

    /// Decode the key pair, checking the embedded public key matches it.
    pub fn key_pair(&self) -> Result<Ed25519KeyPair, CryptoError> {
        let secret = self
            .secret_key_multibase
            .as_deref()
            .ok_or_else(|| CryptoError::InvalidSecretKey("document has no secretKeyMultibase".into()))?;
        let kp = decode_secret_key(secret)?;
        if kp.public_key() != self.public_key()? {
            return Err(CryptoError::InvalidSecretKey(
                "publicKeyMultibase does not match secretKeyMultibase".into(),
            ));
        }
        Ok(kp)
    }

    /// Read a key document from disk.
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        obadge_core::fsio::read_json_opt(path)?.ok_or_else(|| CryptoError::KeyFile {
            path: path.to_path_buf(),
            reason: "file not found".into(),
        })
    }

    /// Write the document to disk. Private documents are restricted to the
    /// owner on Unix.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        obadge_core::fsio::write_json_atomic(path, self)?;
        #[cfg(unix)]
        if self.secret_key_multibase.is_some() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| obadge_core::StorageError::io(path, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_has_z6mk_prefix() {
        // ed25519-pub multikeys always start with z6Mk.
        let kp = Ed25519KeyPair::from_seed(&[3u8; 32]);
        assert!(encode_public_key(&kp.public_key()).starts_with("z6Mk"));
    }

    #[test]
    fn public_key_round_trip() {
        let kp = Ed25519KeyPair::generate();
        let enc = encode_public_key(&kp.public_key());
        assert_eq!(decode_public_key(&enc).unwrap(), kp.public_key());
    }

    #[test]
    fn secret_key_round_trip() {
        let kp = Ed25519KeyPair::generate();
        let enc = encode_secret_key(&kp);
        assert!(enc.starts_with('z'));
        assert_eq!(decode_secret_key(&enc).unwrap().public_key(), kp.public_key());
    }

    #[test]
    fn wrong_header_is_rejected() {
        let kp = Ed25519KeyPair::generate();
        let secret = encode_secret_key(&kp);
        assert!(decode_public_key(&secret).is_err());
        let public = encode_public_key(&kp.public_key());
        assert!(decode_secret_key(&public).is_err());
    }

    #[test]
    fn non_base58btc_is_rejected() {
        assert!(matches!(decode_multibase("uAAAA"), Err(CryptoError::Multibase(_))));
        assert!(matches!(decode_multibase("z0OIl"), Err(CryptoError::Multibase(_))));
    }

    #[test]
    fn proof_value_round_trip() {
        let sig = Ed25519Signature::from_bytes([9u8; 64]);
        let enc = encode_proof_value(&sig);
        assert_eq!(decode_proof_value(&enc).unwrap(), sig);
        assert!(decode_proof_value("z2").is_err());
    }

    #[test]
    fn generated_documents_are_consistent() {
        let g = MultikeyDocument::generate("https://credentials.cognipilot.org/issuer", "key-1");
        assert_eq!(g.public.id, "https://credentials.cognipilot.org/issuer#key-1");
        assert_eq!(g.public.key_type, "Multikey");
        assert!(g.public.secret_key_multibase.is_none());
        let kp = g.private.key_pair().unwrap();
        assert_eq!(kp.public_key(), g.public.public_key().unwrap());
    }

    #[test]
    fn mismatched_private_document_is_rejected() {
        let a = MultikeyDocument::generate("did:example:a", "key-1");
        let b = MultikeyDocument::generate("did:example:b", "key-1");
        let mut spliced = a.private.clone();
        spliced.public_key_multibase = b.public.public_key_multibase.clone();
        assert!(spliced.key_pair().is_err());
    }

    #[test]
    fn serialized_field_names() {
        let g = MultikeyDocument::generate("did:example:x", "key-1");
        let v = serde_json::to_value(&g.private).unwrap();
        assert_eq!(v["type"], "Multikey");
        assert!(v["publicKeyMultibase"].as_str().unwrap().starts_with("z6Mk"));
        assert!(v["secretKeyMultibase"].is_string());
        let p = serde_json::to_value(&g.public).unwrap();
        assert!(p.get("secretKeyMultibase").is_none());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys/key-1-private.json");
        let g = MultikeyDocument::generate("did:example:x", "key-1");
        g.private.save(&path).unwrap();
        let loaded = MultikeyDocument::load(&path).unwrap();
        assert_eq!(loaded, g.private);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn load_missing_is_key_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MultikeyDocument::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CryptoError::KeyFile { .. }));
    }
}
