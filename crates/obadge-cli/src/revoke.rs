//! # Revoke: flip revocation bits from the command line.
//!
//! ```bash
//! obadge revoke --credential jane-doe/tsc-member-2026
//! obadge revoke --email jane@example.com --achievement tsc-member-2026
//! obadge revoke --unrevoke jane-doe/tsc-member-2026
//! obadge revoke --list
//! ```
//!
//! Command-line revocations are deliberate operator actions, so each one
//! carries a fresh submission id (nanosecond clock plus a random nonce) and
//! is never mistaken for a replay, even when repeated within a second.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};

use obadge_core::{AchievementId, CredentialKey, Email};
use obadge_engine::{EngineError, Request, RevokeRequest, Submission};

use crate::{describe, error_json, print_json, CliContext, EXIT_NOT_FOUND, EXIT_OK};

/// `obadge revoke` arguments.
#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["credential", "email", "unrevoke", "list"])
))]
pub struct RevokeArgs {
    /// Credential to revoke, as `wallet_slug/achievement_id`.
    #[arg(long, value_name = "ID")]
    pub credential: Option<String>,

    /// Owner e-mail of the credential to revoke.
    #[arg(long, requires = "achievement")]
    pub email: Option<String>,

    /// Achievement of the credential to revoke, with `--email`.
    #[arg(long, requires = "email")]
    pub achievement: Option<String>,

    /// Credential to restore, as `wallet_slug/achievement_id`.
    #[arg(long, value_name = "ID")]
    pub unrevoke: Option<String>,

    /// List every credential with its status.
    #[arg(long)]
    pub list: bool,

    /// Report what would change without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute `obadge revoke`.
pub fn run_revoke(args: &RevokeArgs, ctx: &CliContext) -> Result<u8> {
    let engine = ctx.engine()?;
    if args.list {
        let rows = engine.credentials();
        if args.json {
            print_json(&rows)?;
        } else if rows.is_empty() {
            println!("No credentials issued.");
        } else {
            for row in &rows {
                let state = if row.revoked { "revoked" } else { "active" };
                println!(
                    "  {:<7} {:>5}  {}  <{}>",
                    state, row.status_list_index, row.credential, row.email
                );
            }
        }
        return Ok(EXIT_OK);
    }

    let submission = submission_for(args)?;
    let result = if args.dry_run {
        engine.plan(&submission).map(|(o, _)| o)
    } else {
        engine.apply(&submission)
    };
    match result {
        Ok(outcome) => {
            if args.json {
                print_json(&outcome)?;
            } else {
                println!("{}", describe(&outcome));
            }
            Ok(EXIT_OK)
        }
        Err(e @ EngineError::NotFound(_)) => {
            if args.json {
                print_json(&error_json(&e))?;
            } else {
                eprintln!("{e}");
            }
            Ok(EXIT_NOT_FOUND)
        }
        Err(e) => Err(e).context("revocation failed"),
    }
}

fn submission_for(args: &RevokeArgs) -> Result<Submission> {
    let request = if let Some(id) = &args.unrevoke {
        RevokeRequest::by_key(parse_key(id)?, true)
    } else if let Some(id) = &args.credential {
        RevokeRequest::by_key(parse_key(id)?, false)
    } else {
        let email = args.email.as_deref().context("--email is required")?;
        let achievement = args.achievement.as_deref().context("--achievement is required")?;
        RevokeRequest::by_owner(
            Email::parse(email).context("invalid --email")?,
            AchievementId::parse(achievement).context("invalid --achievement")?,
            false,
        )
    };
    Ok(Submission::new(Request::Revoke(request)).with_id(submission_id()))
}

fn submission_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("cli-{nanos}-{:016x}", rand::random::<u64>())
}

fn parse_key(id: &str) -> Result<CredentialKey> {
    CredentialKey::parse(id).with_context(|| format!("invalid credential id {id:?}"))
}
