//! `bd show` - print issues by ID.

use clap::Args;

use crate::cli::{Cli, CommandContext};
use crate::error::Result;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Issue IDs.
    #[arg(required = true)]
    pub ids: Vec<String>,
}

/// # Errors
///
/// `IssueNotFound` for unknown IDs; storage errors.
pub fn execute(args: &ShowArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::resolve(cli)?;
    let mut store = ctx.open_store()?;

    let mut issues = Vec::new();
    for id in &args.ids {
        issues.push(store.get_issue(&ctx.cancel, id)?);
    }

    if ctx.json {
        println!("{}", serde_json::to_string(&issues)?);
        return Ok(());
    }

    for issue in &issues {
        println!("{}  [{}] {}", issue.id, issue.status, issue.title);
        if let Some(description) = &issue.description {
            println!("  {description}");
        }
        if !issue.labels.is_empty() {
            println!("  labels: {}", issue.labels.join(", "));
        }
        for dep in store.dependencies_for(&ctx.cancel, &issue.id)? {
            println!("  {} -> {} ({})", dep.issue_id, dep.depends_on_id, dep.dep_type);
        }
    }
    Ok(())
}
