//! Serve command.

use chatrelay_core::config::{BindMode, Config, StoreKind};
use chatrelay_gateway::Gateway;
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Serve command arguments. Each flag overrides the config file.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind mode (loopback, lan)
    #[arg(short, long)]
    pub bind: Option<BindMode>,

    /// Port number
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Identity store backend (memory, sqlite)
    #[arg(long)]
    pub store: Option<StoreKind>,

    /// SQLite database file
    #[arg(long)]
    pub db: Option<PathBuf>,
}

impl ServeArgs {
    fn apply(self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.gateway.bind = bind;
        }
        if let Some(port) = self.port {
            config.gateway.port = port;
        }
        if let Some(kind) = self.store {
            config.store.kind = kind;
            if kind == StoreKind::Memory {
                config.store.path = None;
            }
        }
        if let Some(db) = self.db {
            config.store.path = Some(db);
        }
    }
}

/// Run the serve command until Ctrl-C.
pub async fn run(args: ServeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = Config::load_or_default(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    let store = chatrelay_store::open(&config).await?;
    let gateway = Gateway::new(config, store);

    let shutdown = gateway.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    gateway.run().await?;
    Ok(())
}
