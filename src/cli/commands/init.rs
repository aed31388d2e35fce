//! `bd init` - create (or hydrate) a workspace.

use clap::Args;
use std::fs;
use std::path::Path;

use crate::cli::Cli;
use crate::config::{Config, Metadata};
use crate::error::{BeadsError, Result};
use crate::storage::{OpenOptions, Store};
use crate::sync::{self, ResolveConfig};
use crate::util::cancel::CancelToken;
use crate::version::VERSION;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Issue ID prefix for this repository.
    #[arg(long, default_value = "bd")]
    pub prefix: String,

    /// Reinitialize an existing workspace.
    #[arg(long)]
    pub force: bool,
}

/// # Errors
///
/// `AlreadyInitialized` without `--force`; storage errors on create.
pub fn execute(args: &InitArgs, _cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let beads_dir = cwd.join(".beads");

    if beads_dir.join("metadata.json").exists() && !args.force {
        return Err(BeadsError::AlreadyInitialized { path: beads_dir });
    }
    fs::create_dir_all(&beads_dir)?;

    let metadata = Metadata::default();
    metadata.save(&beads_dir)?;
    write_gitignore(&beads_dir)?;

    let cancel = CancelToken::new();
    let mut store = Store::open(&beads_dir, &OpenOptions::default())?;
    store.set_metadata(&cancel, "bd_version", VERSION)?;
    store.set_metadata(&cancel, "issue_prefix", &args.prefix)?;

    let mut config = Config::load(Some(&beads_dir))?;
    config.save_value("issue-prefix", &args.prefix)?;

    // Fresh clone: hydrate from the committed snapshot when present.
    let jsonl = beads_dir.join(sync::ISSUES_FILE);
    if jsonl.is_file() {
        let result = sync::import_issues(&mut store, &jsonl, &cancel, &ResolveConfig::default())?;
        println!(
            "Initialized beads workspace (prefix: {}); imported {} issue(s) from JSONL",
            args.prefix,
            result.applied()
        );
    } else {
        println!("Initialized beads workspace (prefix: {})", args.prefix);
    }
    Ok(())
}

fn write_gitignore(beads_dir: &Path) -> Result<()> {
    let path = beads_dir.join(".gitignore");
    if path.exists() {
        return Ok(());
    }
    // Machine-local files never land in version control.
    fs::write(
        path,
        "metadata.json\nconfig.local.yaml\n*.db\n*.db-wal\n*.db-shm\n*.lock\n.local_version\ndolt-config.log\n",
    )?;
    Ok(())
}
