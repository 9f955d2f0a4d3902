//! Tessera master server entrypoint.
//!
//! The heavy lifting (configuration, logging, bootstrap, shutdown) lives in
//! dedicated modules so this file remains a thin orchestrator.

mod config;
mod lifecycle;
mod logging;

use anyhow::Result;
use config::ServerConfig;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration, falling back to defaults when the file is absent.
    let config = match ServerConfig::from_file("server.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: failed to load server.toml: {}", e);
            eprintln!("Using defaults");
            ServerConfig::default()
        }
    };

    // Logging before any other side effects.
    logging::init_logging(
        &config.logging.level,
        &config.logging.file_path,
        config.logging.log_to_console,
    )?;

    info!("Tessera master server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "RPC address: {}  distributed: {}",
        config.master.rpc_bind_address,
        !config.master.follower_addresses.is_empty() || config.master.leader_address.is_some()
    );

    let master = lifecycle::bootstrap(&config)?;
    lifecycle::run(master).await
}
