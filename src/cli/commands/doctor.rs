//! `bd doctor` - diagnostics and recovery.

use clap::Args;

use crate::cli::Cli;
use crate::config::{self, Config};
use crate::doctor::{self, CheckStatus, fix};
use crate::error::{BeadsError, Result};
use crate::version::VERSION;

#[derive(Debug, Args)]
pub struct DoctorArgs {
    /// Apply safe fixes (stale lock, metadata.json mismatches).
    #[arg(long)]
    pub fix: bool,

    /// Rebuild source for `--fix`: currently only `jsonl`.
    #[arg(long)]
    pub source: Option<String>,

    /// Proceed with destructive-adjacent fixes (rebuild over an
    /// existing database).
    #[arg(long)]
    pub force: bool,
}

/// # Errors
///
/// Returns an error (exit 1) when any check reports `error`; warnings
/// exit 0. No repository at all is a silent no-op.
pub fn execute(args: &DoctorArgs, cli: &Cli) -> Result<()> {
    // Repository-but-no-database is a diagnosis; no repository at all
    // is simply not our problem.
    let Ok(beads_dir) = config::discover_beads_dir(None) else {
        return Ok(());
    };
    let config = Config::load(Some(&beads_dir))?;

    if args.fix {
        let mut actions: Vec<String> = Vec::new();
        if let Some(message) = fix::fix_stale_lock(&beads_dir)? {
            actions.push(message);
        }
        if let Some(message) = fix::fix_database_config(&beads_dir)? {
            actions.push(message);
        }
        let wants_rebuild = args.source.as_deref() == Some("jsonl") || args.force;
        if wants_rebuild {
            actions.push(fix::rebuild_from_jsonl(&beads_dir)?);
        }
        for action in &actions {
            println!("fixed: {action}");
        }
        if actions.is_empty() {
            println!("Nothing to fix.");
        }
    }

    let checks = doctor::run_all(&beads_dir, VERSION, &config);

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "ok": !doctor::has_errors(&checks),
                "checks": checks,
            })
        );
    } else {
        println!("bd doctor");
        for check in &checks {
            let label = match check.status {
                CheckStatus::Ok => "OK   ",
                CheckStatus::Warning => "WARN ",
                CheckStatus::Error => "ERROR",
            };
            println!("{label} {}: {}", check.name, check.message);
            if let Some(detail) = &check.detail {
                for line in detail.lines() {
                    println!("      {line}");
                }
            }
            if let Some(fix_hint) = &check.fix {
                println!("      fix: {fix_hint}");
            }
        }
    }

    if doctor::has_errors(&checks) {
        return Err(BeadsError::Config("doctor found errors".to_string()));
    }
    Ok(())
}
