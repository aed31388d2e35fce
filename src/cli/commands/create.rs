//! `bd create` - add an issue.

use clap::Args;
use chrono::Utc;
use std::str::FromStr;

use crate::cli::{Cli, CommandContext};
use crate::config::SyncMode;
use crate::error::Result;
use crate::model::{Dependency, DependencyType, Issue, IssueType, Priority};
use crate::storage::IssueFilter;
use crate::sync::{self, ExportOptions, SyncTrigger};
use crate::util::id::{IdConfig, IdGenerator, child_id};

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Issue title.
    pub title: String,

    /// Free-text body.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Priority 0-4 (or P0-P4).
    #[arg(short, long, default_value = "2")]
    pub priority: String,

    /// Issue type: task, bug, feature, epic, chore.
    #[arg(short = 't', long = "type", default_value = "task")]
    pub issue_type: String,

    #[arg(long)]
    pub assignee: Option<String>,

    /// Labels (repeatable).
    #[arg(short, long)]
    pub label: Vec<String>,

    /// Create as a dotted child of this issue.
    #[arg(long)]
    pub parent: Option<String>,
}

/// # Errors
///
/// Validation, ID generation, or storage errors.
pub fn execute(args: &CreateArgs, cli: &Cli) -> Result<()> {
    let ctx = CommandContext::resolve(cli)?;
    let mut store = ctx.open_store()?;

    let now = Utc::now();
    let id = match &args.parent {
        Some(parent) => {
            // Counter-assigned suffixes are never reused, even after
            // the child that held one is deleted.
            let suffix = store.next_child_suffix(&ctx.cancel, parent)?;
            child_id(parent, suffix)
        }
        None => {
            let existing = store.list_issues(
                &ctx.cancel,
                &IssueFilter {
                    include_closed: true,
                    ..IssueFilter::default()
                },
            )?;
            let generator = IdGenerator::new(IdConfig {
                prefix: ctx.config.issue_prefix(),
                ..IdConfig::default()
            });
            generator.generate(&args.title, now, existing.len(), |candidate| {
                existing.iter().any(|issue| issue.id == candidate)
            })
        }
    };

    let issue = Issue {
        id: id.clone(),
        title: args.title.clone(),
        description: args.description.clone(),
        priority: Priority::from_str(&args.priority)?,
        issue_type: IssueType::from_str(&args.issue_type)?,
        assignee: args.assignee.clone(),
        labels: args.label.clone(),
        created_at: now,
        updated_at: now,
        ..Issue::default()
    };

    store.upsert_issue(&ctx.cancel, &issue)?;
    if let Some(parent) = &args.parent {
        store.upsert_dependency(
            &ctx.cancel,
            &Dependency {
                issue_id: id.clone(),
                depends_on_id: parent.clone(),
                dep_type: DependencyType::ParentChild,
                metadata: None,
                thread_id: None,
                created_at: now,
            },
        )?;
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
    if mode == SyncMode::DoltNative || mode == SyncMode::BeltAndSuspenders {
        if ctx.config.get_string("dolt.auto-commit").as_deref() != Some("off") {
            let message = format!("bd: create {id}");
            let _ = store.commit(&ctx.cancel, Some(&message));
        }
    }

    if ctx.json {
        println!("{}", serde_json::json!({ "id": id }));
    } else {
        println!("Created {id}");
    }
    Ok(())
}
