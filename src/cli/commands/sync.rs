//! `bd sync` - drive the JSONL pipeline.

use clap::Args;

use crate::cli::{Cli, CommandContext};
use crate::error::Result;
use crate::sync::{self, ExportOptions, ResolveConfig};

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Import the snapshot instead of exporting.
    #[arg(long)]
    pub import: bool,

    /// Also write dependencies.jsonl.
    #[arg(long)]
    pub deps: bool,

    /// Rewrite the snapshot even when nothing changed.
    #[arg(long)]
    pub force: bool,
}

/// # Errors
///
/// Storage or I/O errors from the pipeline.
pub fn execute(args: &SyncArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::resolve(cli)?;
    let mut store = ctx.open_store()?;
    let jsonl = ctx.jsonl_path();

    if args.import {
        let resolve = ResolveConfig::from_config(&ctx.config);
        let result = sync::import_issues(&mut store, &jsonl, &ctx.cancel, &resolve)?;

        let deps_path = ctx.beads_dir.join(sync::DEPENDENCIES_FILE);
        if deps_path.is_file() {
            sync::import_dependencies(&mut store, &deps_path, &ctx.cancel)?;
        }

        if ctx.json {
            println!(
                "{}",
                serde_json::json!({
                    "created": result.created,
                    "updated": result.updated,
                    "unchanged": result.unchanged,
                    "errors": result.errors.len(),
                    "conflicts": result.conflicts,
                })
            );
        } else {
            println!(
                "Imported: {} created, {} updated, {} unchanged",
                result.created, result.updated, result.unchanged
            );
            for error in &result.errors {
                eprintln!("Warning: line {}: {}", error.line, error.reason);
            }
            for conflict in &result.conflicts {
                println!(
                    "conflict {} {}: ours={} theirs={}",
                    conflict.issue_id, conflict.field, conflict.ours, conflict.theirs
                );
            }
        }
        return Ok(());
    }

    let result = sync::export_issues(
        &mut store,
        &jsonl,
        &ctx.cancel,
        &ExportOptions { force: args.force },
    )?;
    if args.deps {
        sync::export_dependencies(&mut store, &ctx.beads_dir.join(sync::DEPENDENCIES_FILE), &ctx.cancel)?;
    }

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({
                "changed": result.changed,
                "skipped_unchanged": result.skipped_unchanged,
                "wrote_file": result.wrote_file,
            })
        );
    } else if result.wrote_file {
        println!(
            "Exported {} changed issue(s) ({} unchanged) to {}",
            result.changed,
            result.skipped_unchanged,
            result.path.display()
        );
    } else {
        println!("Nothing to export.");
    }
    Ok(())
}
