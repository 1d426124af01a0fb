//! chatrelay CLI entry point.

use chatrelay_cli::{log_directive, run, Cli};
use chatrelay_core::{env, Config};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // The configured level only applies when no filter is set in the environment.
    let level = Config::load_or_default(cli.config.as_deref())
        .map(|config| config.logging.level)
        .unwrap_or_default();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env(env::vars::LOG)
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new(log_directive(cli.verbose, level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run the command
    run(cli).await
}
