//! # Ed25519 Signing and Verification
//!
//! Key generation, signing and verification for credential and status list
//! proofs.
//!
//! ## Security Invariant
//!
//! - The signing input MUST be a [`SigningInput`]: the 64-byte concatenation
//!   of two SHA-256 digests over [`CanonicalBytes`]. Raw bytes cannot be
//!   signed, so every signature in the system covers JCS-canonical content.
//! - Private keys are never serialized or logged. [`Ed25519KeyPair`] does not
//!   implement `Serialize`, prints as `<private>`, and the inner
//!   `SigningKey` is zeroized on drop.

use ed25519_dalek::Signer;
use obadge_core::{sha256_digest, CanonicalBytes};

use crate::error::CryptoError;

/// The message actually signed by an `eddsa-jcs-2022` proof:
/// `SHA-256(JCS(proof options)) ‖ SHA-256(JCS(unsecured document))`.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningInput([u8; 64]);

impl SigningInput {
    /// Hash the canonical proof options and canonical document and join the
    /// two digests, proof options first.
    pub fn new(proof_options: &CanonicalBytes, document: &CanonicalBytes) -> Self {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(sha256_digest(proof_options).as_bytes());
        bytes[32..].copy_from_slice(sha256_digest(document).as_bytes());
        Self(bytes)
    }

    /// The 64 bytes handed to Ed25519.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl std::fmt::Debug for SigningInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningInput({}...)", hex_prefix(&self.0))
    }
}

/// An Ed25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ed25519PublicKey([u8; 32]);

/// An Ed25519 signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ed25519Signature([u8; 64]);

/// An Ed25519 key pair for signing operations.
pub struct Ed25519KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

// ---------------------------------------------------------------------------
// Ed25519PublicKey
// ---------------------------------------------------------------------------

impl Ed25519PublicKey {
    /// Wrap raw public key bytes, checking they encode a curve point.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Build from a slice that must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Self::from_bytes(arr)
    }

    /// The raw 32-byte key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn to_verifying_key(self) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl std::fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519PublicKey({}...)", hex_prefix(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Ed25519Signature
// ---------------------------------------------------------------------------

impl Ed25519Signature {
    /// Wrap raw signature bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Build from a slice that must be exactly 64 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignatureLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// The raw 64-byte signature.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl std::fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Signature({}...)", hex_prefix(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Ed25519KeyPair
// ---------------------------------------------------------------------------

impl Ed25519KeyPair {
    /// Generate a new random key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Rebuild a key pair from its 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// The 32-byte seed. Callers must treat the result as secret and
    /// zeroize it after use.
    pub fn seed(&self) -> zeroize::Zeroizing<[u8; 32]> {
        zeroize::Zeroizing::new(self.signing_key.to_bytes())
    }

    /// The matching public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a proof signing input. Deterministic (RFC 8032).
    pub fn sign(&self, input: &SigningInput) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(input.as_bytes()).to_bytes())
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519KeyPair(<private>)")
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify a signature over a proof signing input.
///
/// Uses `verify_strict`, which also rejects small-order public keys and
/// non-canonical signature encodings.
pub fn verify(
    input: &SigningInput,
    signature: &Ed25519Signature,
    public_key: &Ed25519PublicKey,
) -> Result<(), CryptoError> {
    let vk = public_key.to_verifying_key()?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify_strict(input.as_bytes(), &sig)
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(doc: serde_json::Value) -> SigningInput {
        let options = CanonicalBytes::new(&json!({
            "type": "DataIntegrityProof",
            "cryptosuite": "eddsa-jcs-2022",
            "created": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        SigningInput::new(&options, &CanonicalBytes::new(&doc).unwrap())
    }

    #[test]
    fn sign_and_verify() {
        let kp = Ed25519KeyPair::generate();
        let msg = input(json!({"id": "urn:test"}));
        let sig = kp.sign(&msg);
        assert!(verify(&msg, &sig, &kp.public_key()).is_ok());
    }

    #[test]
    fn tampered_document_fails() {
        let kp = Ed25519KeyPair::generate();
        let sig = kp.sign(&input(json!({"name": "Jane"})));
        let err = verify(&input(json!({"name": "Jahn"})), &sig, &kp.public_key());
        assert!(matches!(err, Err(CryptoError::VerificationFailed(_))));
    }

    #[test]
    fn wrong_key_fails() {
        let a = Ed25519KeyPair::generate();
        let b = Ed25519KeyPair::generate();
        let msg = input(json!({}));
        assert!(verify(&msg, &a.sign(&msg), &b.public_key()).is_err());
    }

    #[test]
    fn signing_is_deterministic() {
        let kp = Ed25519KeyPair::from_seed(&[7u8; 32]);
        let msg = input(json!({"a": 1}));
        assert_eq!(kp.sign(&msg), kp.sign(&msg));
    }

    #[test]
    fn seed_round_trip() {
        let kp = Ed25519KeyPair::generate();
        let again = Ed25519KeyPair::from_seed(&kp.seed());
        assert_eq!(kp.public_key(), again.public_key());
    }

    #[test]
    fn signing_input_is_two_digests() {
        let a = CanonicalBytes::new(&json!({"p": 1})).unwrap();
        let b = CanonicalBytes::new(&json!({"d": 2})).unwrap();
        let si = SigningInput::new(&a, &b);
        assert_eq!(&si.as_bytes()[..32], sha256_digest(&a).as_bytes());
        assert_eq!(&si.as_bytes()[32..], sha256_digest(&b).as_bytes());
        assert_ne!(si, SigningInput::new(&b, &a));
    }

    #[test]
    fn slice_constructors_check_length() {
        assert!(matches!(
            Ed25519Signature::from_slice(&[0u8; 63]),
            Err(CryptoError::InvalidSignatureLength(63))
        ));
        assert!(Ed25519PublicKey::from_slice(&[0u8; 31]).is_err());
        let kp = Ed25519KeyPair::generate();
        let pk = Ed25519PublicKey::from_slice(kp.public_key().as_bytes()).unwrap();
        assert_eq!(pk, kp.public_key());
    }

    #[test]
    fn debug_hides_private_key() {
        let kp = Ed25519KeyPair::from_seed(&[1u8; 32]);
        assert_eq!(format!("{kp:?}"), "Ed25519KeyPair(<private>)");
    }

    proptest::proptest! {
        #[test]
        fn any_flipped_signature_bit_fails(seed in proptest::array::uniform32(0u8..), bit in 0usize..512) {
            let kp = Ed25519KeyPair::from_seed(&seed);
            let msg = input(json!({"id": "urn:prop"}));
            let mut bytes = *kp.sign(&msg).as_bytes();
            bytes[bit / 8] ^= 1 << (bit % 8);
            proptest::prop_assert!(verify(&msg, &Ed25519Signature::from_bytes(bytes), &kp.public_key()).is_err());
        }
    }
}
