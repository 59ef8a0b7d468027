pub mod onboard;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "signaltrack",
    about = "Focus signal tracking, task signal queue & daily score"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Interactive first-run setup
    Onboard {
        #[arg(long, default_value_t = false)]
        install_daemon: bool,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Status,
    Doctor,
    Start,
    Stop,
    Restart,
    /// Compute and persist the daily score
    Score {
        #[arg(long)]
        date: Option<String>,
    },
    /// Show the signal queue and backlog size
    Queue {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Print the morning briefing
    Briefing,
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },
    Service,
    Uninstall,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum AiCommands {
    Test {
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}
