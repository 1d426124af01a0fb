//! chatrelay command-line interface.

pub mod commands;

use chatrelay_core::config::LogLevel;
use clap::{Parser, Subcommand};

/// chatrelay - real-time chat relay
#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "CHATRELAY_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat gateway
    Serve(commands::serve::ServeArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Filter directive for the given `-v` count and configured level.
pub fn log_directive(verbose: u8, level: LogLevel) -> String {
    let level = match verbose {
        0 => level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    // sqlx logs every statement at debug.
    format!("{},sqlx=warn", level)
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config_path).await,
        Commands::Config(args) => commands::config::run(args, config_path).await,
        Commands::Version => {
            println!("chatrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
