//! # Quarry CLI
//!
//! Command-line interface for the Quarry search engine.
//!
//! ## Commands
//!
//! - `quarry index <path>` - Index a file or directory
//! - `quarry search <query>` - Run a query
//! - `quarry watch <path>...` - Keep paths in sync until stdin closes
//! - `quarry status` - Show store statistics
//! - `quarry shell` - Line-oriented command loop
//! - `quarry clear` - Wipe the store
//!
//! ## Example Usage
//!
//! ```bash
//! quarry index ~/articles
//! quarry search "'fall' AND NOT 'memory' HAVING avg(ratings) >= 4 LIMIT 10"
//! quarry search lov --json
//! ```

mod app;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Quarry - Full-text search with BM25 ranking
#[derive(Parser)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store directory (defaults to the configured data directory)
    #[arg(long, global = true, env = "QUARRY_DB")]
    db: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a file or every allowed file below a directory
    Index {
        /// File or directory to index
        path: PathBuf,
    },

    /// Search the store
    #[command(alias = "s")]
    Search {
        /// Query, e.g. "'river' AND NOT 'sea' LIMIT 10", or a bare word prefix
        query: String,

        /// Print hits as JSON
        #[arg(long)]
        json: bool,
    },

    /// Watch paths and keep the store in sync until stdin is closed
    Watch {
        /// Paths to watch
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Seconds between syncs (overrides the config file)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show store status and statistics
    Status,

    /// Read `index <db> <path>`, `search <db> <query>` and `q` from stdin
    Shell,

    /// Remove every document from the store
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => quarry_core::Config::load_from(path)?,
        None => quarry_core::Config::load()?,
    };

    // Setup logging
    let log_level = log_filter(cli.quiet, cli.verbose, &config.general.log_level);
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    let db = cli.db;

    // Execute command
    match cli.command {
        Commands::Index { path } => commands::index::run(config, db, &path),
        Commands::Search { query, json } => commands::search::run(config, db, &query, json),
        Commands::Watch { paths, interval } => commands::watch::run(config, db, paths, interval),
        Commands::Status => commands::status::run(config, db),
        Commands::Shell => commands::shell::run(config),
        Commands::Clear { yes } => commands::clear::run(config, db, yes),
    }
}

/// Filter directive from the command line flags, falling back to the
/// configured level.
fn log_filter(quiet: bool, verbose: u8, configured: &str) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}
