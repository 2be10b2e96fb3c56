//! CLI for resmon: watch the local machine or capture one snapshot.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "resmon")]
#[command(about = "Background host and GPU usage monitor")]
#[command(version = resmon_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample the machine on a fixed cadence and print windowed averages
    Watch {
        /// Snapshots taken per second
        #[arg(long, default_value_t = 2.0)]
        frequency: f64,

        /// Seconds between reports of windowed averages
        #[arg(long, default_value_t = 30.0)]
        period: f64,

        /// Stop after this many seconds (default: run until Ctrl+C)
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Capture a single snapshot of the current machine stats and print it
    Snapshot {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    // Default to warn so capability warnings surface without RUST_LOG set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Watch {
            frequency,
            period,
            duration,
        } => commands::watch::run(frequency, period, duration),
        Commands::Snapshot { json } => commands::snapshot::run(json),
    }
}
