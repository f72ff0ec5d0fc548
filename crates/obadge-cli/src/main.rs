//! # obadge CLI entry point
//!
//! Parses command-line arguments, installs the tracing subscriber and
//! dispatches to the subcommand handlers in `obadge_cli`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use obadge_cli::bake::{run_bake, run_extract, BakeArgs, ExtractArgs};
use obadge_cli::keygen::{run_keygen, KeygenArgs};
use obadge_cli::process::{run_process, ProcessArgs};
use obadge_cli::revoke::{run_revoke, RevokeArgs};
use obadge_cli::status::{run_status, StatusArgs};
use obadge_cli::verify::{run_verify, VerifyArgs};
use obadge_cli::CliContext;

/// Environment variable that overrides the `-v` log filter.
const LOG_ENV: &str = "OBADGE_LOG";

/// OpenBadges 3.0 credential issuer.
///
/// Issues, updates and revokes signed credentials stored as static files:
/// per-recipient wallets, baked SVG/PNG badges and a signed revocation list.
#[derive(Parser, Debug)]
#[command(name = "obadge", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file (default: obadge.yaml in the repository root).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Repository root (default: nearest ancestor holding obadge.yaml or achievements/).
    #[arg(long, global = true)]
    repo_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending request files.
    Process(ProcessArgs),

    /// Revoke, restore or list credentials.
    Revoke(RevokeArgs),

    /// Verify a credential JSON, SVG or PNG badge.
    Verify(VerifyArgs),

    /// Status list statistics or re-rendering.
    Status(StatusArgs),

    /// Generate the issuer's Ed25519 Multikey pair.
    Keygen(KeygenArgs),

    /// Bake a credential into an SVG or PNG badge.
    Bake(BakeArgs),

    /// Extract the credential baked into a badge.
    Extract(ExtractArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match std::env::var(LOG_ENV) {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::new(spec),
        _ => EnvFilter::new(level_for(cli.verbose)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let repo_root = cli.repo_root.clone().unwrap_or_else(|| {
        resolve_repo_root().unwrap_or_else(|| {
            tracing::debug!("no repository markers found; using current directory");
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    });
    tracing::debug!(repo_root = %repo_root.display(), "resolved repository root");

    let ctx = CliContext {
        repo_root,
        config_path: cli.config.clone(),
    };

    let result = match &cli.command {
        Commands::Process(args) => run_process(args, &ctx),
        Commands::Revoke(args) => run_revoke(args, &ctx),
        Commands::Verify(args) => run_verify(args, &ctx),
        Commands::Status(args) => run_status(args, &ctx),
        Commands::Keygen(args) => run_keygen(args, &ctx),
        Commands::Bake(args) => run_bake(args, &ctx),
        Commands::Extract(args) => run_extract(args, &ctx),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Walk up from the current directory to the first directory holding
/// `obadge.yaml` or an `achievements/` catalog.
fn resolve_repo_root() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let mut dir = cwd.as_path();
    loop {
        if dir.join(obadge_engine::CONFIG_FILE_NAME).is_file() || dir.join("achievements").is_dir() {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}
