//! Durastream CLI
//!
//! Command-line tools for durable stream backup logs.
//!
//! # Commands
//!
//! - `inspect` - Validate a backup log and summarize it
//! - `dump` - List the records in a backup log
//! - `rollback` - Restore a target file from its backup log
//! - `commit` - Keep a target file's changes and empty its backup log

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Durable stream recovery tools.
#[derive(Parser)]
#[command(name = "durastream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a backup log and summarize it
    Inspect {
        /// Path to the backup log
        log: PathBuf,

        /// Treat a truncated final record as the end of the log
        #[arg(short, long)]
        tolerate_torn_tail: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the records in a backup log
    Dump {
        /// Path to the backup log
        log: PathBuf,

        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Undo every pending change recorded in a backup log
    Rollback {
        /// Path to the backup log
        log: PathBuf,

        /// Path to the target file the log protects
        #[arg(short, long)]
        target: PathBuf,
    },

    /// Keep every pending change and empty the backup log
    Commit {
        /// Path to the backup log
        log: PathBuf,

        /// Path to the target file the log protects
        #[arg(short, long)]
        target: PathBuf,
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
        Commands::Inspect {
            log,
            tolerate_torn_tail,
            format,
        } => {
            commands::inspect::run(&log, tolerate_torn_tail, &format)?;
        }
        Commands::Dump { log, limit, format } => {
            commands::dump::run(&log, limit, &format)?;
        }
        Commands::Rollback { log, target } => {
            commands::resolve::rollback(&target, &log)?;
        }
        Commands::Commit { log, target } => {
            commands::resolve::commit(&target, &log)?;
        }
        Commands::Version => {
            println!("durastream CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("durastream core v{}", durastream_core::VERSION);
        }
    }

    Ok(())
}
