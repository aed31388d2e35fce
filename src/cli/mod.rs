//! Thin command layer over the core subsystems.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{self, Config};
use crate::error::Result;
use crate::storage::{OpenOptions, Store};
use crate::util::cancel::CancelToken;

#[derive(Debug, Parser)]
#[command(name = "bd", version, about = "Local-first issue tracker")]
pub struct Cli {
    /// Machine-readable JSON output.
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output (includes config override reporting).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Acting user (defaults to config, then $USER).
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Lock wait timeout in milliseconds.
    #[arg(long, global = true)]
    pub lock_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize a beads workspace in the current directory.
    Init(commands::init::InitArgs),
    /// Create a new issue.
    Create(commands::create::CreateArgs),
    /// List issues.
    List(commands::list::ListArgs),
    /// Show issues by ID.
    Show(commands::show::ShowArgs),
    /// Close issues.
    Close(commands::close::CloseArgs),
    /// Run diagnostic checks (optionally apply fixes).
    Doctor(commands::doctor::DoctorArgs),
    /// Export/import the JSONL snapshot.
    Sync(commands::sync::SyncArgs),
    /// Read and write configuration.
    Config(commands::config::ConfigArgs),
    /// Dolt backend settings and remote operations.
    Dolt(commands::dolt::DoltArgs),
    /// Apply the schema migration to the current database.
    Migrate,
    /// Print version information.
    Version,
}

/// Shared per-invocation state for repo-bound commands.
pub struct CommandContext {
    pub beads_dir: PathBuf,
    pub config: Config,
    pub cancel: CancelToken,
    pub json: bool,
    pub verbose: bool,
}

impl CommandContext {
    /// Discover the workspace and load the config stack, recording any
    /// explicitly-set global flags at the top of the precedence chain.
    ///
    /// # Errors
    ///
    /// `NotInitialized` when no `.beads/` directory is found.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let beads_dir = config::discover_beads_dir(None)?;
        let mut cfg = Config::load(Some(&beads_dir))?;
        if let Some(actor) = &cli.actor {
            cfg.set_flag("actor", actor.clone());
        }
        if cli.json {
            cfg.set_flag("json", "true");
        }
        if let Some(timeout) = cli.lock_timeout {
            cfg.set_flag("lock-timeout", timeout.to_string());
        }

        if cli.verbose {
            for item in cfg.overrides() {
                eprintln!(
                    "Config: {} overridden by {} (was: {} from {}, now: {})",
                    item.key,
                    item.overridden_by,
                    item.original_value.as_deref().unwrap_or("<unset>"),
                    item.original_source,
                    item.effective_value
                );
            }
        }

        // Install as the process-wide instance so background work
        // (export hooks, notifications) reads the same view.
        config::init_global(cfg.clone());

        Ok(Self {
            beads_dir,
            config: cfg,
            cancel: CancelToken::new(),
            json: cli.json,
            verbose: cli.verbose,
        })
    }

    /// Open the configured store writably.
    ///
    /// # Errors
    ///
    /// Backend open errors (lock, missing database, unreachable server).
    pub fn open_store(&self) -> Result<Store> {
        Store::open(&self.beads_dir, &self.open_options(false))
    }

    /// Options honoring the configured lock timeout and hierarchy depth.
    #[must_use]
    pub fn open_options(&self, read_only: bool) -> OpenOptions {
        OpenOptions {
            read_only,
            create: !read_only,
            lock_timeout_ms: self
                .config
                .get_int("lock-timeout")
                .and_then(|value| u64::try_from(value).ok())
                .unwrap_or(30_000),
            max_depth: self.config.max_hierarchy_depth(),
        }
    }

    /// Path of the canonical JSONL snapshot.
    #[must_use]
    pub fn jsonl_path(&self) -> PathBuf {
        self.beads_dir.join(crate::sync::ISSUES_FILE)
    }
}
