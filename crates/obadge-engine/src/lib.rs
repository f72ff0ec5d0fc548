//! # obadge-engine: Credential Lifecycle Engine
//!
//! Issues, updates, renames, removes and revokes OpenBadges 3.0 credentials
//! held in recipient wallets, and publishes them as static files: a signed
//! `credential.json` per credential, baked SVG/PNG badges, and one signed
//! revocation status list.
//!
//! ## Layers
//!
//! | Module | Role |
//! |---|---|
//! | [`request`] | the closed set of mutation requests and their replay digest |
//! | [`engine`] | dispatcher: validate, run handler, commit one change set |
//! | [`directory`] | e-mail → wallet mapping, merges, slug retirement |
//! | [`slug`] | slug derivation, disambiguation and anonymization |
//! | [`store`] | change sets with all-or-nothing commit |
//! | [`intake`] | request files and receipts |
//! | [`verify`] | read-only verification of issued artifacts |
//! | [`keys`] | signing key resolution and key generation |
//! | [`config`] | `obadge.yaml` and the repository layout |
//!
//! ## Crate Policy
//!
//! - Handlers never write. They compute against cloned state; the
//!   dispatcher commits or discards.
//! - Every error is one of the five [`ErrorKind`]s, and none leaves
//!   committed state half-applied.
//! - One writer per repository at a time: entry points take the workspace
//!   lock and reload state from disk before running.

pub mod catalog;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
mod handlers;
pub mod intake;
pub mod keys;
pub mod ledger;
pub mod outcome;
pub mod request;
pub mod slug;
pub mod store;
pub mod verify;

pub use catalog::AchievementCatalog;
pub use config::{ConfigError, EngineConfig, MergePolicy, WorkspacePaths, CONFIG_FILE_NAME};
pub use directory::{CredentialRecord, Wallet, WalletDirectory};
pub use engine::{CredentialSummary, Engine};
pub use error::{EngineError, ErrorKind};
pub use outcome::{BatchEntry, BatchReport, Outcome, RequestState};
pub use request::{
    CreateRequest, CredentialState, RemoveRequest, RenameRequest, Request, RevokeRequest,
    Submission, UpdateRequest,
};
pub use verify::{verify_artifact, Verdict, VerificationReport};
