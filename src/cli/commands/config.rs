//! `bd config` - read and write the layered configuration.

use clap::{Args, Subcommand};

use crate::cli::{Cli, CommandContext};
use crate::error::{BeadsError, Result};

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective value and its source.
    Get { key: String },
    /// Write a key into .beads/config.yaml (other keys preserved).
    Set { key: String, value: String },
    /// Report keys whose effective value overrides the config file.
    Overrides,
}

/// # Errors
///
/// `Config` for unknown keys on `get`; write failures on `set` are
/// reported as warnings, never fatal to the primary action.
pub fn execute(args: &ConfigArgs, cli: &Cli) -> Result<()> {
    let mut ctx = CommandContext::resolve(cli)?;

    match &args.command {
        ConfigCommand::Get { key } => {
            let Some(value) = ctx.config.get_string(key) else {
                return Err(BeadsError::Config(format!("unknown key '{key}'")));
            };
            if ctx.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "key": key,
                        "value": value,
                        "source": ctx.config.source_of(key),
                    })
                );
            } else {
                println!("{value}  ({})", ctx.config.source_of(key));
            }
        }
        ConfigCommand::Set { key, value } => {
            if let Err(err) = ctx.config.save_value(key, value) {
                // A failed config write must not abort the caller's
                // primary action.
                eprintln!("Warning: failed to write config: {err}");
                return Ok(());
            }
            println!("Set {key} = {value} (in config.yaml)");
        }
        ConfigCommand::Overrides => {
            let overrides = ctx.config.overrides();
            if ctx.json {
                println!("{}", serde_json::to_string(&overrides)?);
            } else if overrides.is_empty() {
                println!("No overrides; all values come from the config file or defaults.");
            } else {
                for item in overrides {
                    println!(
                        "{}: {} (from {}, overriding {} from {})",
                        item.key,
                        item.effective_value,
                        item.overridden_by,
                        item.original_value.as_deref().unwrap_or("<unset>"),
                        item.original_source
                    );
                }
            }
        }
    }
    Ok(())
}
