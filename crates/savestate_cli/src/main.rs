//! savestate CLI
//!
//! Command-line tools for savestate files.
//!
//! # Commands
//!
//! - `inspect` - Display file statistics
//! - `verify` - Verify file integrity without modifying it
//! - `compact` - Rewrite the file to live records only
//! - `dump` - List records for debugging
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// savestate command-line tools.
#[derive(Parser)]
#[command(name = "savestate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the savestate file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display file statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify file integrity without modifying the file
    Verify,

    /// Rewrite the file to contain only live records
    Compact {
        /// Dry run - report what would be reclaimed
        #[arg(short, long)]
        dry_run: bool,
    },

    /// List records for debugging
    Dump {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("File path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("File path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("File path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Dump { limit } => {
            let path = cli.path.ok_or("File path required for dump")?;
            commands::dump::run(&path, limit)?;
        }
        Commands::Version => {
            println!("savestate CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("savestate core v{}", savestate_core::VERSION);
        }
    }

    Ok(())
}
