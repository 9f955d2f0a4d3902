//! Master startup options and their `[master]` config section.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::host_port::HostPort;

/// Runtime options of one master process.
#[derive(Debug, Clone)]
pub struct MasterOptions {
    /// Whether this master is the configured quorum leader.
    pub leader: bool,
    /// Addresses of the follower masters, from the leader's point of view.
    pub follower_addresses: Vec<HostPort>,
    /// Address of the leader master, from a follower's point of view.
    pub leader_address: Option<HostPort>,
    /// The address this master's RPC endpoint binds to.
    pub rpc_bind_address: HostPort,
}

impl MasterOptions {
    /// Options for a single-master deployment.
    pub fn standalone(rpc_bind_address: HostPort) -> MasterOptions {
        MasterOptions {
            leader: false,
            follower_addresses: Vec::new(),
            leader_address: None,
            rpc_bind_address,
        }
    }

    /// True when this master participates in a multi-master quorum.
    pub fn is_distributed(&self) -> bool {
        !self.follower_addresses.is_empty() || self.leader_address.is_some()
    }

    /// The address other peers should use to reach this master.
    pub fn first_rpc_address(&self) -> &HostPort {
        &self.rpc_bind_address
    }
}

/// The `[master]` section of server.toml.
///
/// If neither `follower_addresses` nor `leader_address` is set, the master
/// runs standalone and hosts a local single-peer quorum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Storage root for catalog and consensus metadata.
    #[serde(default = "default_fs_root")]
    pub fs_root: String,

    /// Address to bind the master RPC endpoint to.
    #[serde(default = "default_rpc_bind_address")]
    pub rpc_bind_address: String,

    /// Whether this master is the configured quorum leader.
    #[serde(default)]
    pub leader: bool,

    /// Follower addresses, set on the leader.
    #[serde(default)]
    pub follower_addresses: Vec<String>,

    /// Leader address, set on followers.
    #[serde(default)]
    pub leader_address: Option<String>,

    /// Statically-known peer uuids by address, used when the RPC messenger
    /// is unavailable to resolve them.
    #[serde(default)]
    pub peer_uuids: HashMap<String, String>,
}

fn default_fs_root() -> String {
    "./data/master".to_string()
}

fn default_rpc_bind_address() -> String {
    "127.0.0.1:7051".to_string()
}

impl Default for MasterConfig {
    fn default() -> Self {
        MasterConfig {
            fs_root: default_fs_root(),
            rpc_bind_address: default_rpc_bind_address(),
            leader: false,
            follower_addresses: Vec::new(),
            leader_address: None,
            peer_uuids: HashMap::new(),
        }
    }
}

impl MasterConfig {
    /// Check if this configuration is valid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.fs_root.is_empty() {
            return Err("fs_root cannot be empty".to_string());
        }
        if self.leader && self.follower_addresses.is_empty() {
            return Err("a leader master must declare follower_addresses".to_string());
        }
        if self.leader && self.leader_address.is_some() {
            return Err("a leader master must not declare leader_address".to_string());
        }
        if !self.leader && !self.follower_addresses.is_empty() {
            return Err("only the leader master declares follower_addresses".to_string());
        }
        Ok(())
    }

    /// Parses the address strings into [`MasterOptions`].
    pub fn to_options(&self) -> Result<MasterOptions> {
        let rpc_bind_address: HostPort = self
            .rpc_bind_address
            .parse()
            .map_err(|e: TesseraError| e.prepend("bad rpc_bind_address"))?;
        let follower_addresses = self
            .follower_addresses
            .iter()
            .map(|s| {
                s.parse()
                    .map_err(|e: TesseraError| e.prepend("bad follower address"))
            })
            .collect::<Result<Vec<HostPort>>>()?;
        let leader_address = self
            .leader_address
            .as_ref()
            .map(|s| {
                s.parse()
                    .map_err(|e: TesseraError| e.prepend("bad leader_address"))
            })
            .transpose()?;
        Ok(MasterOptions {
            leader: self.leader,
            follower_addresses,
            leader_address,
            rpc_bind_address,
        })
    }
}
