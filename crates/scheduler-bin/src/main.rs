//! schdlstr - schedules pre-signed nostr events and publishes them when due.

mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scheduler_config_and_utils::{init_logging, Config, Paths};

/// schdlstr command-line interface.
#[derive(Parser)]
#[command(name = "schdlstr")]
#[command(about = "Schedule signed nostr events and publish them to relays when due")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, database, relays, logs). Defaults to ~/.schdlstr
    #[arg(long, global = true, env = "SCHDLSTR_BASE_DIR")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the publisher until interrupted
    Run,
    /// Run a single publish cycle and exit
    Once,
    /// Schedule a signed event
    Submit {
        /// File holding the signed event JSON, or "-" for stdin
        #[arg(short, long)]
        event: PathBuf,
        /// When to publish (RFC 3339, or YYYY-MM-DDTHH:MM[:SS] in UTC)
        #[arg(short, long)]
        publish_at: String,
    },
    /// List scheduled events and their delivery state
    List {
        /// Only events signed by this pubkey
        #[arg(long)]
        pubkey: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Queue an event for delivery again with a fresh attempt budget
    Reset {
        /// Event id
        id: String,
    },
    /// Show the relays the publisher will use
    Relays,
    /// Show event counts per delivery status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    let command = cli.command.unwrap_or(Commands::Run);
    let service_name = match &command {
        Commands::Run | Commands::Once => "publisher",
        _ => "cli",
    };
    init_logging(service_name, &config.log_level, Some(paths.log_file()));

    match command {
        Commands::Run => app::run_publisher(config, paths).await?,
        Commands::Once => app::run_once(config, paths).await?,
        Commands::Submit { event, publish_at } => {
            commands::submit(&config, &paths, &event, &publish_at).await?
        }
        Commands::List { pubkey, json } => {
            commands::list(&config, &paths, pubkey.as_deref(), json).await?
        }
        Commands::Reset { id } => commands::reset(&config, &paths, &id).await?,
        Commands::Relays => commands::relays(&config, &paths),
        Commands::Status => commands::status(&config, &paths).await?,
    }

    Ok(())
}
