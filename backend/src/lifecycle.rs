//! Server bootstrap and shutdown.

use crate::config::ServerConfig;
use std::sync::Arc;
use tessera_consensus::resolver::{PeerUuidResolver, StaticPeerResolver};
use tessera_master::Master;

/// Brings the master up: storage root, system catalog, consensus.
pub fn bootstrap(config: &ServerConfig) -> anyhow::Result<Master> {
    let options = config.master.to_options()?;

    // Peer uuid resolution normally rides the RPC messenger; until that is
    // wired up, distributed deployments declare peer uuids in config.
    let resolver: Arc<dyn PeerUuidResolver> =
        Arc::new(StaticPeerResolver::from(config.master.peer_uuids.clone()));

    let master = Master::start(&config.master.fs_root, options, resolver)?;
    log::info!(
        "Master is up: fs root {}, uuid {}",
        config.master.fs_root,
        master.fs().uuid()
    );
    Ok(master)
}

/// Runs until a termination signal arrives, then stops the master.
pub async fn run(master: Master) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    log::info!("Shutdown signal received, stopping master...");
    master.shutdown();
    log::info!("Master stopped.");
    Ok(())
}
