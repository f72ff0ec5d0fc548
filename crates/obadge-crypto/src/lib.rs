//! # obadge-crypto: Signing Primitives for the Credential Engine
//!
//! - **Ed25519** signing and verification over a [`SigningInput`], the
//!   two-digest message of an `eddsa-jcs-2022` Data Integrity proof.
//! - **Multikey** encoding of keys and proof values (multicodec header plus
//!   multibase base58btc) and the on-disk key documents.
//! - **Key providers**: the [`KeyProvider`] capability that the credential
//!   signer and the status list manager sign through.

pub mod ed25519;
pub mod error;
pub mod key_provider;
pub mod multikey;

pub use ed25519::{verify, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, SigningInput};
pub use error::CryptoError;
pub use key_provider::{EnvKeyProvider, KeyProvider, LocalKeyProvider};
pub use multikey::{GeneratedMultikey, MultikeyDocument};
