use clap::Parser;
use std::io::{self, IsTerminal};

use beads::cli::{Cli, Commands, commands};
use beads::version;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // Version tracking runs before dispatch so repo-bound commands see
    // a consistent upgrade state; with no repository it is silent.
    version::track_version();
    if version::upgrade_detected() {
        if let Ok(beads_dir) = beads::config::discover_beads_dir(None) {
            version::auto_migrate_on_version_bump(&beads_dir);
        }
        version::maybe_show_upgrade_notification();
    }

    let result = match &cli.command {
        Commands::Init(args) => commands::init::execute(args, &cli),
        Commands::Create(args) => commands::create::execute(args, &cli),
        Commands::List(args) => commands::list::execute(args, &cli),
        Commands::Show(args) => commands::show::execute(args, &cli),
        Commands::Close(args) => commands::close::execute(args, &cli),
        Commands::Doctor(args) => commands::doctor::execute(args, &cli),
        Commands::Sync(args) => commands::sync::execute(args, &cli),
        Commands::Config(args) => commands::config::execute(args, &cli),
        Commands::Dolt(args) => commands::dolt::execute(args, &cli),
        Commands::Migrate => commands::migrate::execute(&cli),
        Commands::Version => commands::version::execute(cli.json),
    };

    if let Err(err) = result {
        let use_json = cli.json || !io::stdout().is_terminal();
        if use_json {
            eprintln!(
                "{}",
                serde_json::to_string(&err.to_json()).unwrap_or_else(|_| err.to_string())
            );
        } else {
            eprintln!("Error: {err}");
            if let Some(hint) = err.fix_hint() {
                eprintln!("Hint: {hint}");
            }
        }
        std::process::exit(err.exit_code());
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_filter = if quiet {
        "error"
    } else if verbose {
        "beads=debug"
    } else {
        "beads=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
