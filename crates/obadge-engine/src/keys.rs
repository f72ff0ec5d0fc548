//! # Signing Key Resolution
//!
//! The engine treats the key as an opaque [`KeyProvider`]. Resolution order:
//!
//! 1. the environment variable named by `signing_key_env`, when set and
//!    non-empty (CI runners inject the private Multikey document there);
//! 2. the private Multikey document at `layout.private_key`.

use std::path::{Path, PathBuf};

use obadge_crypto::{
    EnvKeyProvider, Ed25519PublicKey, KeyProvider, LocalKeyProvider, MultikeyDocument,
};

use crate::config::{EngineConfig, WorkspacePaths};
use crate::error::EngineError;

/// Load the signing key.
pub fn signing_provider(
    config: &EngineConfig,
    paths: &WorkspacePaths,
) -> Result<Box<dyn KeyProvider>, EngineError> {
    if let Some(var) = config.signing_key_env.as_deref() {
        let present = std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false);
        if present {
            let provider = EnvKeyProvider::from_env(var)?;
            tracing::info!(var, method = provider.verification_method(), "signing key from environment");
            return Ok(Box::new(provider));
        }
    }
    if !paths.private_key.is_file() {
        return Err(EngineError::Signing(format!(
            "no signing key: {} does not exist (run `obadge keygen`)",
            paths.private_key.display()
        )));
    }
    Ok(Box::new(LocalKeyProvider::from_key_file(&paths.private_key)?))
}

/// Load a public key from a Multikey document (public or private).
pub fn public_key(path: &Path) -> Result<Ed25519PublicKey, EngineError> {
    Ok(MultikeyDocument::load(path)?.public_key()?)
}

/// Paths of a freshly written key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFiles {
    /// Private document (mode 0600 on Unix).
    pub private: PathBuf,
    /// Public document.
    pub public: PathBuf,
    /// Verification method id.
    pub verification_method: String,
}

/// Generate a key pair and write `<key_id>-private.json` and
/// `<key_id>-public.json` into `out_dir`. Refuses to overwrite an existing
/// private key unless `force` is set.
pub fn generate(
    out_dir: &Path,
    issuer_id: &str,
    key_id: &str,
    force: bool,
) -> Result<KeyFiles, EngineError> {
    if key_id.is_empty() || !key_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(EngineError::Validation(format!("invalid key id {key_id:?}")));
    }
    let private = out_dir.join(format!("{key_id}-private.json"));
    let public = out_dir.join(format!("{key_id}-public.json"));
    if private.exists() && !force {
        return Err(EngineError::Conflict(format!(
            "{} already exists; pass --force to replace it",
            private.display()
        )));
    }
    let generated = MultikeyDocument::generate(issuer_id, key_id);
    generated.private.save(&private)?;
    generated.public.save(&public)?;
    tracing::info!(method = %generated.public.id, "key pair generated");
    Ok(KeyFiles {
        private,
        public,
        verification_method: generated.public.id.clone(),
    })
}
