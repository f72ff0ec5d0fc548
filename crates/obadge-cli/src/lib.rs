//! # obadge-cli: The `obadge` Command
//!
//! Thin operator surface over [`obadge_engine`]. Every subcommand module
//! exposes an `XArgs` struct for clap and a `run_x(&args, &ctx)` returning
//! the process exit code.
//!
//! ## Subcommands
//!
//! - `obadge process`: apply pending request files.
//! - `obadge revoke`: revoke, restore or list credentials.
//! - `obadge verify`: check a credential, SVG or PNG badge.
//! - `obadge status`: status list statistics or a forced re-render.
//! - `obadge keygen`: generate the issuer's Multikey pair.
//! - `obadge bake` / `obadge extract`: manual badge baking.
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | success |
//! | 1 | internal failure (I/O, signing, configuration) |
//! | 2 | at least one request was rejected |
//! | 3 | the credential does not exist |
//! | 4 | negative verification verdict, or no baked payload |

pub mod bake;
pub mod keygen;
pub mod process;
pub mod revoke;
pub mod status;
pub mod verify;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use obadge_engine::{keys, Engine, EngineConfig, EngineError, Outcome, WorkspacePaths};

/// Success.
pub const EXIT_OK: u8 = 0;
/// Some requests in a batch were rejected.
pub const EXIT_REJECTED: u8 = 2;
/// The targeted credential does not exist.
pub const EXIT_NOT_FOUND: u8 = 3;
/// Verification verdict was not `valid`, or an image had no payload.
pub const EXIT_NEGATIVE: u8 = 4;

/// Global options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CliContext {
    /// Repository root.
    pub repo_root: PathBuf,
    /// Explicit `--config` file.
    pub config_path: Option<PathBuf>,
}

impl CliContext {
    /// Load the configuration: `--config`, else `obadge.yaml` in the
    /// repository root, else the defaults.
    pub fn config(&self) -> Result<EngineConfig> {
        let explicit = self
            .config_path
            .as_deref()
            .map(|p| resolve_path(p, &self.repo_root));
        EngineConfig::discover(&self.repo_root, explicit.as_deref()).context("loading configuration")
    }

    /// File locations under the repository root.
    pub fn paths(&self, config: &EngineConfig) -> WorkspacePaths {
        WorkspacePaths::resolve(&self.repo_root, &config.layout)
    }

    /// Open the engine with the configured signing key.
    pub fn engine(&self) -> Result<Engine> {
        let config = self.config()?;
        let paths = self.paths(&config);
        let provider = keys::signing_provider(&config, &paths).context("loading signing key")?;
        Engine::open(config, &self.repo_root, provider)
            .with_context(|| format!("opening repository {}", self.repo_root.display()))
    }
}

/// Resolve a path that may be relative to the repository root.
///
/// Absolute paths are returned unchanged. A relative path that exists under
/// `repo_root` resolves there; otherwise it stays relative to the current
/// directory.
pub fn resolve_path(path: &Path, repo_root: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let repo_relative = repo_root.join(path);
    if repo_relative.exists() {
        repo_relative
    } else {
        path.to_path_buf()
    }
}

/// One-line human summary of an outcome.
pub fn describe(outcome: &Outcome) -> String {
    fn list<T: std::fmt::Display>(items: &[T]) -> String {
        items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    }
    match outcome {
        Outcome::Created { credential, status_list_index, new_wallet } => {
            let wallet = if *new_wallet { ", new wallet" } else { "" };
            format!("created {credential} (index {status_list_index}{wallet})")
        }
        Outcome::Updated { wallet, credentials, email_changed } => {
            let email = if *email_changed { ", e-mail changed" } else { "" };
            format!("updated {wallet}: {}{email}", list(credentials))
        }
        Outcome::Merged { from, into, credentials, dropped } => {
            let mut s = format!("merged {from} into {into}: {}", list(credentials));
            if !dropped.is_empty() {
                s.push_str(&format!(" (dropped {})", list(dropped)));
            }
            s
        }
        Outcome::Renamed { from, to, credentials } => {
            format!("renamed {from} -> {to} ({} credentials)", credentials.len())
        }
        Outcome::Removed { wallet, credentials, wallet_removed } => {
            if *wallet_removed {
                format!("removed wallet {wallet} ({} credentials)", credentials.len())
            } else {
                format!("removed {}", list(credentials))
            }
        }
        Outcome::Revoked { credential, status_list_index } => {
            format!("revoked {credential} (bit {status_list_index})")
        }
        Outcome::Restored { credential, status_list_index } => {
            format!("restored {credential} (bit {status_list_index})")
        }
        Outcome::Unchanged { reason, .. } => format!("unchanged: {reason}"),
    }
}

/// JSON rendering of an engine error for `--json` output.
pub fn error_json(e: &EngineError) -> serde_json::Value {
    serde_json::json!({
        "kind": e.kind().as_str(),
        "message": e.to_string(),
    })
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("rendering JSON")?);
    Ok(())
}
