//! # Verify: check an issued credential or badge.
//!
//! Reads `credential.json`, `badge.svg` or `badge.png`, checks the proof
//! against the issuer's public Multikey and consults the local status list
//! for the revocation bit.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use obadge_core::Timestamp;
use obadge_engine::{keys, verify, verify_artifact, VerificationReport};

use crate::{print_json, resolve_path, CliContext, EXIT_NEGATIVE, EXIT_OK};

/// `obadge verify` arguments.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Credential JSON, SVG or PNG badge.
    pub file: PathBuf,

    /// Public Multikey document (default: the configured public key).
    #[arg(long, value_name = "PUB")]
    pub key: Option<PathBuf>,

    /// Status list credential (default: the configured local list).
    #[arg(long, value_name = "FILE")]
    pub status_list: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute `obadge verify`.
pub fn run_verify(args: &VerifyArgs, ctx: &CliContext) -> Result<u8> {
    let config = ctx.config()?;
    let paths = ctx.paths(&config);

    let key_path = args
        .key
        .as_deref()
        .map(|p| resolve_path(p, &ctx.repo_root))
        .unwrap_or_else(|| paths.public_key.clone());
    let key = keys::public_key(&key_path)
        .with_context(|| format!("loading public key {}", key_path.display()))?;

    let list_path = args
        .status_list
        .as_deref()
        .map(|p| resolve_path(p, &ctx.repo_root))
        .unwrap_or_else(|| paths.status_list.clone());
    let status_list = verify::load_status_list(&list_path, &key).context("loading status list")?;

    let file = resolve_path(&args.file, &ctx.repo_root);
    let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
    let report = verify_artifact(&bytes, &key, status_list.as_ref(), Timestamp::now());

    if args.json {
        print_json(&report)?;
    } else {
        print_report(&file, &report);
    }
    Ok(if report.verdict.is_valid() { EXIT_OK } else { EXIT_NEGATIVE })
}

fn print_report(file: &std::path::Path, report: &VerificationReport) {
    println!("{}: {}", file.display(), report.verdict);
    if let Some(id) = &report.credential_id {
        println!("  credential: {id}");
    }
    if let Some(subject) = &report.subject {
        println!("  subject:    {subject}");
    }
    if let Some(method) = &report.verification_method {
        println!("  signed by:  {method}");
    }
    match (report.status_index, report.status_checked) {
        (Some(i), true) => println!("  status:     bit {i} checked"),
        (Some(i), false) => println!("  status:     bit {i} not checked (no usable status list)"),
        (None, _) => {}
    }
    if let Some(detail) = &report.detail {
        println!("  detail:     {detail}");
    }
}
