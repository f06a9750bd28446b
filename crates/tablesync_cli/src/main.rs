//! TableSync CLI
//!
//! Command-line tools for exercising TableSync.
//!
//! # Commands
//!
//! - `simulate` - Run a multi-player leaderboard session against an in-memory backend
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// TableSync command-line tools.
#[derive(Parser)]
#[command(name = "tablesync")]
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
    /// Simulate players submitting times to shared leaderboards
    Simulate {
        /// Number of players, each with its own session
        #[arg(short, long, default_value = "4")]
        players: usize,

        /// Number of maps
        #[arg(short, long, default_value = "2")]
        maps: usize,

        /// Runs each player submits per map
        #[arg(short, long, default_value = "3")]
        runs: usize,

        /// Probability that a backend write fails
        #[arg(short, long, default_value = "0.2")]
        fail_rate: f64,

        /// Seed for times and injected failures
        #[arg(short, long, default_value = "1")]
        seed: u64,

        /// Give up after this many poll cycles
        #[arg(long, default_value = "1000")]
        max_cycles: usize,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
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
        Commands::Simulate {
            players,
            maps,
            runs,
            fail_rate,
            seed,
            max_cycles,
            format,
        } => {
            let options = commands::simulate::SimulateOptions {
                players,
                maps,
                runs,
                fail_rate,
                seed,
                max_cycles,
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Version => {
            println!("TableSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("TableSync Core v{}", tablesync_core::VERSION);
        }
    }

    Ok(())
}
