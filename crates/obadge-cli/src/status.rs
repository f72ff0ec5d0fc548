//! # Status: revocation list statistics and re-rendering.

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};

use obadge_core::fsio::read_json_opt;
use obadge_status::{StatusRegistry, StatusStats};

use crate::{print_json, CliContext, EXIT_OK};

/// `obadge status` arguments.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("action").required(true).args(["stats", "update"])))]
pub struct StatusArgs {
    /// Print index allocation and revocation counts.
    #[arg(long)]
    pub stats: bool,

    /// Re-encode and re-sign the status list from the registry.
    #[arg(long)]
    pub update: bool,

    /// Print as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute `obadge status`.
pub fn run_status(args: &StatusArgs, ctx: &CliContext) -> Result<u8> {
    let stats = if args.update {
        ctx.engine()?.update_status_list().context("re-signing status list")?
    } else {
        // Reading statistics needs no signing key.
        let config = ctx.config()?;
        let paths = ctx.paths(&config);
        read_json_opt::<StatusRegistry>(&paths.status_registry)
            .context("reading status registry")?
            .unwrap_or_default()
            .stats()
    };
    if args.json {
        print_json(&stats)?;
    } else {
        print_stats(&stats, args.update);
    }
    Ok(EXIT_OK)
}

fn print_stats(stats: &StatusStats, updated: bool) {
    if updated {
        println!("Status list re-signed.");
    }
    println!("  credentials: {}", stats.total);
    println!("  active:      {}", stats.active);
    println!("  revoked:     {}", stats.revoked);
    println!("  retired:     {}", stats.retired);
    println!("  next index:  {}", stats.next_index);
    println!("  capacity:    {} bits", stats.capacity_bits);
}
