//! Resolution of peer UUIDs from their addresses.
//!
//! Peers declared in configuration carry only addresses; before a quorum can
//! be verified and committed, every peer's stable identifier has to be
//! looked up from the peer itself. The lookup transport is an external
//! collaborator behind [`PeerUuidResolver`].

use crate::quorum::Quorum;
use parking_lot::RwLock;
use std::collections::HashMap;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::host_port::HostPort;

/// Resolves a peer's permanent uuid from its last known address.
pub trait PeerUuidResolver: Send + Sync {
    fn resolve_uuid(&self, addr: &HostPort) -> Result<String>;
}

/// Returns a copy of `quorum` with every peer's uuid resolved, in peer order.
///
/// Peers that already carry a uuid are kept as-is. Any resolution failure
/// aborts with an error identifying the unresolved peer.
pub fn resolve_peer_uuids(quorum: &Quorum, resolver: &dyn PeerUuidResolver) -> Result<Quorum> {
    let mut resolved = quorum.clone();
    resolved.peers.clear();
    for peer in &quorum.peers {
        if peer.permanent_uuid.is_some() {
            resolved.peers.push(peer.clone());
            continue;
        }
        log::info!(
            "Peer {} has no permanent uuid. Determining permanent uuid...",
            peer.describe()
        );
        let addr = peer.last_known_addr.as_ref().ok_or_else(|| {
            TesseraError::illegal_state(format!(
                "unable to resolve uuid for peer {}: no address",
                peer.describe()
            ))
        })?;
        let uuid = resolver
            .resolve_uuid(addr)
            .map_err(|e| e.prepend(format!("unable to resolve uuid for peer {}", peer.describe())))?;
        resolved.peers.push(peer.clone().with_uuid(uuid));
    }
    Ok(resolved)
}

/// Address-to-uuid map resolver, for tests and statically-configured
/// deployments where the RPC messenger is unavailable.
#[derive(Debug, Default)]
pub struct StaticPeerResolver {
    uuids: RwLock<HashMap<String, String>>,
}

impl StaticPeerResolver {
    pub fn new() -> Self {
        StaticPeerResolver::default()
    }

    pub fn insert(&self, addr: &HostPort, uuid: impl Into<String>) {
        self.uuids.write().insert(addr.to_string(), uuid.into());
    }
}

impl From<HashMap<String, String>> for StaticPeerResolver {
    fn from(uuids: HashMap<String, String>) -> Self {
        StaticPeerResolver {
            uuids: RwLock::new(uuids),
        }
    }
}

impl PeerUuidResolver for StaticPeerResolver {
    fn resolve_uuid(&self, addr: &HostPort) -> Result<String> {
        self.uuids
            .read()
            .get(&addr.to_string())
            .cloned()
            .ok_or_else(|| {
                TesseraError::network_error(format!("no known peer at {}", addr))
            })
    }
}
