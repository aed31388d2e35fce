//! `bd list` - list issues.

use clap::Args;
use std::str::FromStr;

use crate::cli::{Cli, CommandContext};
use crate::error::Result;
use crate::model::{IssueType, Priority, Status};
use crate::storage::IssueFilter;

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Filter by status.
    #[arg(short, long)]
    pub status: Option<String>,

    /// Filter by issue type.
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    #[arg(long)]
    pub assignee: Option<String>,

    /// Filter by priority (0-4 or P0-P4).
    #[arg(short, long)]
    pub priority: Option<String>,

    #[arg(short, long)]
    pub label: Option<String>,

    /// Include closed issues.
    #[arg(short = 'a', long)]
    pub all: bool,
}

/// # Errors
///
/// Filter parse errors or storage errors.
pub fn execute(args: &ListArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::resolve(cli)?;
    let mut store = ctx.open_store()?;

    let filter = IssueFilter {
        status: args.status.as_deref().map(Status::from_str).transpose()?,
        issue_type: args
            .issue_type
            .as_deref()
            .map(IssueType::from_str)
            .transpose()?,
        assignee: args.assignee.clone(),
        priority: args.priority.as_deref().map(Priority::from_str).transpose()?,
        label: args.label.clone(),
        include_closed: args.all,
    };

    let issues = store.list_issues(&ctx.cancel, &filter)?;

    if ctx.json {
        println!("{}", serde_json::to_string(&issues)?);
        return Ok(());
    }

    for issue in &issues {
        println!(
            "{}  {}  {}  [{}] {}",
            issue.id, issue.priority, issue.issue_type, issue.status, issue.title
        );
    }
    if !ctx.json && issues.is_empty() {
        println!("No matching issues.");
    }
    Ok(())
}
