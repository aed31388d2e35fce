//! `bd dolt` - server-backend settings and remote operations.

use clap::{Args, Subcommand};

use crate::cli::{Cli, CommandContext};
use crate::config::{self, Backend, DoltMode, Metadata};
use crate::error::{BeadsError, Result};
use crate::storage::{CommitOutcome, test_server_connection};

#[derive(Debug, Args)]
pub struct DoltArgs {
    #[command(subcommand)]
    pub command: DoltCommand,
}

#[derive(Debug, Subcommand)]
pub enum DoltCommand {
    /// Show the current backend configuration with a connection test.
    Show,
    /// Set a backend parameter (mode, database, host, port, user).
    Set {
        key: String,
        value: String,
        /// Also write the value to config.yaml for team-wide defaults.
        #[arg(long)]
        update_config: bool,
    },
    /// Test the server connection.
    Test,
    /// Commit pending changes on the server.
    Commit {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Push commits to the Dolt remote.
    Push {
        /// Overwrite the remote branch head.
        #[arg(long)]
        force: bool,
    },
    /// Pull commits from the Dolt remote.
    Pull,
}

/// # Errors
///
/// `Config` for invalid keys/values; backend errors for remote ops.
pub fn execute(args: &DoltArgs, cli: &Cli) -> Result<()> {
    let mut ctx = CommandContext::resolve(cli)?;

    match &args.command {
        DoltCommand::Show => {
            let metadata = Metadata::load_with_env(&ctx.beads_dir)?;
            let reachable = metadata.is_server_mode()
                && test_server_connection(&metadata.server_host, metadata.server_port);

            if ctx.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "backend": metadata.backend.to_string(),
                        "mode": if metadata.mode == DoltMode::Server { "server" } else { "embedded" },
                        "database": metadata.server_database(),
                        "host": metadata.server_host,
                        "port": metadata.server_port,
                        "user": metadata.server_user,
                        "connection_ok": reachable,
                    })
                );
                return Ok(());
            }

            println!("Backend: {}", metadata.backend);
            if metadata.backend == Backend::Dolt {
                println!("  Mode:     {:?}", metadata.mode);
                println!("  Database: {}", metadata.server_database());
                if metadata.is_server_mode() {
                    println!("  Host:     {}", metadata.server_host);
                    println!("  Port:     {}", metadata.server_port);
                    println!("  User:     {}", metadata.server_user);
                    if reachable {
                        println!("  Server connection OK");
                    } else {
                        println!("  Server not reachable");
                    }
                }
            }
            println!("\nConfig sources (priority order):");
            println!("  1. Environment variables (BD_SERVER_*)");
            println!("  2. metadata.json (local, gitignored)");
            println!("  3. config.yaml (team defaults)");
        }

        DoltCommand::Set {
            key,
            value,
            update_config,
        } => {
            let mut metadata = Metadata::load(&ctx.beads_dir)?;
            let yaml_key = apply_setting(&mut metadata, key, value)?;

            // Audit trail records who changed what; append failures
            // stay silent.
            config::append_config_audit(&ctx.beads_dir, key, value);
            metadata.save(&ctx.beads_dir)?;
            println!("Set {key} = {value} (in metadata.json)");

            if *update_config {
                if let Err(err) = ctx.config.save_value(&yaml_key, value) {
                    eprintln!("Warning: failed to update config.yaml: {err}");
                } else {
                    println!("Set {yaml_key} = {value} (in config.yaml)");
                }
            }
        }

        DoltCommand::Test => {
            let metadata = Metadata::load_with_env(&ctx.beads_dir)?;
            let addr = format!("{}:{}", metadata.server_host, metadata.server_port);
            if ctx.json {
                let ok = test_server_connection(&metadata.server_host, metadata.server_port);
                println!(
                    "{}",
                    serde_json::json!({
                        "host": metadata.server_host,
                        "port": metadata.server_port,
                        "connection_ok": ok,
                    })
                );
                if !ok {
                    return Err(BeadsError::RemoteUnavailable { addr });
                }
                return Ok(());
            }

            println!("Testing connection to {addr}...");
            if test_server_connection(&metadata.server_host, metadata.server_port) {
                println!("Connection successful");
                println!("\nYou can now use server mode:");
                println!("  bd dolt set mode server");
            } else {
                println!("Connection failed");
                println!("\nMake sure dolt sql-server is running:");
                println!(
                    "  cd /path/to/dolt/db && dolt sql-server --port={}",
                    metadata.server_port
                );
                return Err(BeadsError::RemoteUnavailable { addr });
            }
        }

        DoltCommand::Commit { message } => {
            let mut store = ctx.open_store()?;
            match store.commit(&ctx.cancel, message.as_deref())? {
                CommitOutcome::Committed => println!("Committed."),
                CommitOutcome::NothingToCommit => println!("Nothing to commit."),
            }
        }

        DoltCommand::Push { force } => {
            let mut store = ctx.open_store()?;
            println!("Pushing to Dolt remote...");
            if *force {
                store.force_push(&ctx.cancel)?;
            } else {
                store.push(&ctx.cancel)?;
            }
            println!("Push complete.");
        }

        DoltCommand::Pull => {
            let mut store = ctx.open_store()?;
            println!("Pulling from Dolt remote...");
            store.pull(&ctx.cancel)?;
            println!("Pull complete.");
        }
    }
    Ok(())
}

fn apply_setting(metadata: &mut Metadata, key: &str, value: &str) -> Result<String> {
    match key {
        "mode" => {
            metadata.mode = match value {
                "embedded" => DoltMode::Embedded,
                "server" => DoltMode::Server,
                _ => {
                    return Err(BeadsError::Config(
                        "mode must be 'embedded' or 'server'".to_string(),
                    ));
                }
            };
            if metadata.mode == DoltMode::Server {
                metadata.backend = Backend::Dolt;
            }
            Ok("dolt.mode".to_string())
        }
        "database" => {
            if value.is_empty() {
                return Err(BeadsError::Config("database name cannot be empty".to_string()));
            }
            metadata.database = value.to_string();
            Ok("dolt.database".to_string())
        }
        "host" => {
            if value.is_empty() {
                return Err(BeadsError::Config("host cannot be empty".to_string()));
            }
            metadata.server_host = value.to_string();
            Ok("dolt.host".to_string())
        }
        "port" => {
            let port: u16 = value
                .parse()
                .ok()
                .filter(|port| *port > 0)
                .ok_or_else(|| {
                    BeadsError::Config("port must be a valid port number (1-65535)".to_string())
                })?;
            metadata.server_port = port;
            Ok("dolt.port".to_string())
        }
        "user" => {
            if value.is_empty() {
                return Err(BeadsError::Config("user cannot be empty".to_string()));
            }
            metadata.server_user = value.to_string();
            Ok("dolt.user".to_string())
        }
        other => Err(BeadsError::Config(format!(
            "unknown key '{other}' (valid: mode, database, host, port, user)"
        ))),
    }
}
