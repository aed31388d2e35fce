//! `bd close` - close issues.
//!
//! Closing is the normal lifecycle end; issues are never deleted here.
//! Closing an issue that blocks another simply frees the other.

use chrono::Utc;
use clap::Args;

use crate::cli::{Cli, CommandContext};
use crate::error::Result;
use crate::model::Status;
use crate::sync::{self, ExportOptions, SyncTrigger};

#[derive(Debug, Args)]
pub struct CloseArgs {
    /// Issue IDs to close.
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Close reason.
    #[arg(short, long, default_value = "done")]
    pub reason: String,
}

/// # Errors
///
/// `IssueNotFound` for unknown IDs; storage errors.
pub fn execute(args: &CloseArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::resolve(cli)?;
    let mut store = ctx.open_store()?;

    let now = Utc::now();
    for id in &args.ids {
        let mut issue = store.get_issue(&ctx.cancel, id)?;
        if issue.status == Status::Closed {
            println!("{id} is already closed");
            continue;
        }
        issue.status = Status::Closed;
        issue.close_reason = Some(args.reason.clone());
        issue.closed_at = Some(now);
        issue.updated_at = now;
        store.upsert_issue(&ctx.cancel, &issue)?;
        println!("Closed {id}");
    }

    let mode = ctx.config.sync_mode();
    let export_on = ctx
        .config
        .get_string("sync.export_on")
        .unwrap_or_else(|| "push".to_string());
    if sync::should_export(mode, &export_on, SyncTrigger::Change) {
        sync::export_issues(
            &mut store,
            &ctx.jsonl_path(),
            &ctx.cancel,
            &ExportOptions::default(),
        )?;
    }
    Ok(())
}
