//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod db;
mod export;
mod fetch;
mod init;
mod searches;
mod serve;
mod stats;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use photolabel::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "photolabel")]
#[command(about = "Label photos from a paged photo search")]
#[command(version)]
pub struct Cli {
    /// Target directory or database file (overrides config file).
    /// Can be a directory containing photolabel.db or a .db file directly.
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Start the labeling web server
    Serve {
        /// Address to bind: PORT, HOST, or HOST:PORT
        #[arg(default_value = "127.0.0.1:3030")]
        bind: String,
        /// Skip running migrations on startup
        #[arg(long)]
        no_migrate: bool,
    },

    /// Download the first photos of a search without labeling them
    Fetch {
        /// Search text
        query: String,
        /// Number of photos to download
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
        /// Output directory (defaults to the images directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List known searches and how far labeling has got
    Searches,

    /// Show label counts by value and by user
    Stats,

    /// Export labels as CSV
    Export {
        /// Only export labels from this search
        #[arg(long)]
        search_id: Option<i32>,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also back up the full export to the remote mirror
        #[arg(long)]
        backup: bool,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Run database migrations
    Migrate {
        /// Database URL (defaults to the configured database)
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
}

/// Parse arguments, load settings and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        target: cli.target,
    };
    let (settings, _config) = load_settings_with_options(options)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Db { command } => match command {
            DbCommands::Migrate { database_url } => {
                db::cmd_migrate(&settings, database_url.as_deref()).await
            }
        },
        Commands::Serve { bind, no_migrate } => serve::cmd_serve(&settings, &bind, no_migrate).await,
        Commands::Fetch {
            query,
            count,
            output,
        } => fetch::cmd_fetch(&settings, &query, count, output).await,
        Commands::Searches => searches::cmd_searches(&settings).await,
        Commands::Stats => stats::cmd_stats(&settings).await,
        Commands::Export {
            search_id,
            output,
            backup,
        } => export::cmd_export(&settings, search_id, output.as_deref(), backup).await,
    }
}
