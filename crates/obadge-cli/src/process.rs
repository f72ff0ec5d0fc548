//! # Process: apply pending request files.
//!
//! ```bash
//! obadge process                          # every pending file in requests/
//! obadge process --request requests/42.json
//! obadge process --dry-run -v             # report, write nothing
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use obadge_engine::BatchReport;

use crate::{describe, error_json, print_json, resolve_path, CliContext, EXIT_OK, EXIT_REJECTED};

/// `obadge process` arguments.
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Process only this request file.
    #[arg(long, value_name = "FILE")]
    pub request: Option<PathBuf>,

    /// Plan every request and list the files it would touch, without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute `obadge process`.
pub fn run_process(args: &ProcessArgs, ctx: &CliContext) -> Result<u8> {
    let engine = ctx.engine()?;
    let only = args.request.as_deref().map(|p| resolve_path(p, &ctx.repo_root));
    let report = engine
        .process_requests(only.as_deref(), args.dry_run)
        .context("processing requests")?;

    if args.json {
        print_json(&report_json(&report))?;
    } else {
        print_report(&report);
    }
    Ok(if report.all_applied() { EXIT_OK } else { EXIT_REJECTED })
}

fn print_report(report: &BatchReport) {
    if report.entries.is_empty() {
        println!("No pending requests.");
        return;
    }
    let verb = if report.dry_run { "would apply" } else { "applied" };
    for entry in &report.entries {
        match &entry.result {
            Ok(outcome) => println!("  {verb:<11} {}: {}", entry.source, describe(outcome)),
            Err(e) => println!("  {:<11} {}: {e}", "rejected", entry.source),
        }
        if report.dry_run {
            for path in &entry.changes {
                println!("              - {}", path.display());
            }
        }
    }
    let applied = report.applied().count();
    let rejected = report.rejected().count();
    println!();
    println!("{applied} {verb}, {rejected} rejected");
}

fn report_json(report: &BatchReport) -> serde_json::Value {
    let entries: Vec<_> = report
        .entries
        .iter()
        .map(|e| {
            let (outcome, error) = match &e.result {
                Ok(o) => (serde_json::to_value(o).unwrap_or_default(), serde_json::Value::Null),
                Err(err) => (serde_json::Value::Null, error_json(err)),
            };
            json!({
                "source": e.source,
                "state": e.state,
                "outcome": outcome,
                "error": error,
                "changes": e.changes,
            })
        })
        .collect();
    json!({ "dry_run": report.dry_run, "entries": entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use obadge_engine::{BatchEntry, EngineError, Outcome, RequestState};

    #[test]
    fn json_report_shape() {
        let report = BatchReport {
            entries: vec![
                BatchEntry {
                    source: "a.json".into(),
                    state: RequestState::Applied,
                    result: Ok(Outcome::Unchanged {
                        wallet: None,
                        credential: None,
                        reason: "same".into(),
                    }),
                    changes: vec![PathBuf::from("requests/a.json")],
                },
                BatchEntry {
                    source: "b.json".into(),
                    state: RequestState::Rejected,
                    result: Err(EngineError::Conflict("slug taken".into())),
                    changes: vec![],
                },
            ],
            dry_run: true,
        };
        let v = report_json(&report);
        assert_eq!(v["dry_run"], true);
        assert_eq!(v["entries"][0]["outcome"]["outcome"], "unchanged");
        assert_eq!(v["entries"][0]["changes"][0], "requests/a.json");
        assert_eq!(v["entries"][1]["state"], "rejected");
        assert_eq!(v["entries"][1]["error"]["kind"], "conflict");
    }
}
