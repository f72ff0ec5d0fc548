//! # Key Provider Abstraction
//!
//! Signing is an opaque capability. The credential signer and the status
//! list manager hold a `&dyn KeyProvider` and never see key material:
//!
//! - [`LocalKeyProvider`]: a key loaded from a private Multikey document on
//!   disk (`keys/key-1-private.json`), or generated in memory for tests.
//! - [`EnvKeyProvider`]: the private Multikey document supplied as JSON in an
//!   environment variable. Suitable for CI runners where the key is injected
//!   as a secret and never written to the checkout.
//!
//! ## Security Invariants
//!
//! - `KeyProvider` is `Send + Sync`.
//! - Signing input is a [`SigningInput`] (never raw bytes).
//! - Key material is zeroized on drop.

use std::path::Path;

use crate::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, SigningInput};
use crate::error::CryptoError;
use crate::multikey::MultikeyDocument;

/// Ed25519 signing backend.
pub trait KeyProvider: Send + Sync {
    /// Sign a proof signing input with the managed key.
    fn sign(&self, input: &SigningInput) -> Result<Ed25519Signature, CryptoError>;

    /// The public half of the managed key.
    fn public_key(&self) -> Result<Ed25519PublicKey, CryptoError>;

    /// The verification method id placed in proofs, `<controller>#<key-id>`.
    fn verification_method(&self) -> &str;

    /// Human-readable name for this provider (for diagnostics).
    fn provider_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// LocalKeyProvider
// ---------------------------------------------------------------------------

/// Key pair held in process memory.
pub struct LocalKeyProvider {
    key: Ed25519KeyPair,
    verification_method: String,
}

impl LocalKeyProvider {
    /// Wrap an existing key pair.
    pub fn new(key: Ed25519KeyPair, verification_method: impl Into<String>) -> Self {
        Self {
            key,
            verification_method: verification_method.into(),
        }
    }

    /// Generate a new random key.
    pub fn generate(verification_method: impl Into<String>) -> Self {
        Self::new(Ed25519KeyPair::generate(), verification_method)
    }

    /// Build from a private Multikey document; the verification method is
    /// the document's `id`.
    pub fn from_document(doc: &MultikeyDocument) -> Result<Self, CryptoError> {
        Ok(Self::new(doc.key_pair()?, doc.id.clone()))
    }

    /// Load a private Multikey document from disk.
    pub fn from_key_file(path: &Path) -> Result<Self, CryptoError> {
        let doc = MultikeyDocument::load(path)?;
        let provider = Self::from_document(&doc).map_err(|e| CryptoError::KeyFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::debug!(key_file = %path.display(), method = %provider.verification_method, "signing key loaded");
        Ok(provider)
    }
}

impl KeyProvider for LocalKeyProvider {
    fn sign(&self, input: &SigningInput) -> Result<Ed25519Signature, CryptoError> {
        Ok(self.key.sign(input))
    }

    fn public_key(&self) -> Result<Ed25519PublicKey, CryptoError> {
        Ok(self.key.public_key())
    }

    fn verification_method(&self) -> &str {
        &self.verification_method
    }

    fn provider_name(&self) -> &str {
        "LocalKeyProvider"
    }
}

impl std::fmt::Debug for LocalKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyProvider")
            .field("verification_method", &self.verification_method)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EnvKeyProvider
// ---------------------------------------------------------------------------

/// Loads the private Multikey document from an environment variable.
///
/// ```bash
/// export OBADGE_SIGNING_KEY="$(cat keys/key-1-private.json)"
/// ```
pub struct EnvKeyProvider {
    inner: LocalKeyProvider,
    var_name: String,
}

impl EnvKeyProvider {
    /// Load the key from the named environment variable.
    pub fn from_env(var_name: &str) -> Result<Self, CryptoError> {
        let raw = zeroize::Zeroizing::new(std::env::var(var_name).map_err(|_| {
            CryptoError::InvalidSecretKey(format!("environment variable {var_name} not set"))
        })?);
        let doc: MultikeyDocument = serde_json::from_str(&raw).map_err(|e| {
            CryptoError::InvalidSecretKey(format!("{var_name} is not a Multikey document: {e}"))
        })?;
        Ok(Self {
            inner: LocalKeyProvider::from_document(&doc)?,
            var_name: var_name.to_string(),
        })
    }

    /// The environment variable this provider was loaded from.
    pub fn var_name(&self) -> &str {
        &self.var_name
    }
}

impl KeyProvider for EnvKeyProvider {
    fn sign(&self, input: &SigningInput) -> Result<Ed25519Signature, CryptoError> {
        self.inner.sign(input)
    }

    fn public_key(&self) -> Result<Ed25519PublicKey, CryptoError> {
        self.inner.public_key()
    }

    fn verification_method(&self) -> &str {
        self.inner.verification_method()
    }

    fn provider_name(&self) -> &str {
        "EnvKeyProvider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ed25519::verify;
    use obadge_core::CanonicalBytes;
    use serde_json::json;

    fn message() -> SigningInput {
        let a = CanonicalBytes::new(&json!({"proof": "options"})).unwrap();
        let b = CanonicalBytes::new(&json!({"credential": true})).unwrap();
        SigningInput::new(&a, &b)
    }

    #[test]
    fn local_provider_sign_and_verify() {
        let provider = LocalKeyProvider::generate("did:example:issuer#key-1");
        let msg = message();
        let sig = provider.sign(&msg).unwrap();
        assert!(verify(&msg, &sig, &provider.public_key().unwrap()).is_ok());
        assert_eq!(provider.verification_method(), "did:example:issuer#key-1");
        assert_eq!(provider.provider_name(), "LocalKeyProvider");
    }

    #[test]
    fn provider_is_object_safe_and_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LocalKeyProvider>();
        assert_send_sync::<EnvKeyProvider>();
        let _boxed: Box<dyn KeyProvider> = Box::new(LocalKeyProvider::generate("x#k"));
    }

    #[test]
    fn from_key_file_uses_document_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key-1-private.json");
        let g = MultikeyDocument::generate("https://credentials.cognipilot.org/issuer", "key-1");
        g.private.save(&path).unwrap();
        let provider = LocalKeyProvider::from_key_file(&path).unwrap();
        assert_eq!(
            provider.verification_method(),
            "https://credentials.cognipilot.org/issuer#key-1"
        );
        assert_eq!(provider.public_key().unwrap(), g.public.public_key().unwrap());
    }

    #[test]
    fn public_document_cannot_sign() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key-1-public.json");
        MultikeyDocument::generate("did:example:x", "key-1").public.save(&path).unwrap();
        let err = LocalKeyProvider::from_key_file(&path).unwrap_err();
        assert!(matches!(err, CryptoError::KeyFile { .. }));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let provider = LocalKeyProvider::generate("did:example:x#key-1");
        let shown = format!("{provider:?}");
        assert!(shown.contains("did:example:x#key-1"));
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn env_provider_missing_var() {
        assert!(EnvKeyProvider::from_env("OBADGE_TEST_KEY_THAT_DOES_NOT_EXIST_12345").is_err());
    }

    #[test]
    fn env_provider_matches_file_provider() {
        let g = MultikeyDocument::generate("did:example:env", "key-1");
        let var = "OBADGE_TEST_KEY_PROVIDER_ENV";
        std::env::set_var(var, serde_json::to_string(&g.private).unwrap());
        let env = EnvKeyProvider::from_env(var).unwrap();
        std::env::remove_var(var);

        let local = LocalKeyProvider::from_document(&g.private).unwrap();
        let msg = message();
        assert_eq!(env.sign(&msg).unwrap(), local.sign(&msg).unwrap());
        assert_eq!(env.verification_method(), "did:example:env#key-1");
        assert_eq!(env.var_name(), var);
    }

    #[test]
    fn env_provider_rejects_non_json() {
        let var = "OBADGE_TEST_KEY_PROVIDER_BAD";
        std::env::set_var(var, "z6MkNotAJsonDocument");
        assert!(EnvKeyProvider::from_env(var).is_err());
        std::env::remove_var(var);
    }
}
