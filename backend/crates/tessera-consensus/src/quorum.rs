//! In-memory model of a replicated-log peer set.
//!
//! A quorum is the ordered peer set for one tablet's replicated log, stamped
//! with a monotonically increasing `seqno`. A `local` quorum has exactly one
//! peer and does no network replication.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::host_port::HostPort;

/// Role of a peer within a quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum PeerRole {
    Leader,
    Follower,
    Candidate,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerRole::Leader => "LEADER",
            PeerRole::Follower => "FOLLOWER",
            PeerRole::Candidate => "CANDIDATE",
        };
        f.write_str(name)
    }
}

/// One peer in a replicated group.
///
/// `permanent_uuid` may be absent until resolved against the remote peer;
/// verification requires it to be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct QuorumPeer {
    pub permanent_uuid: Option<String>,
    pub last_known_addr: Option<HostPort>,
    pub role: PeerRole,
}

impl QuorumPeer {
    pub fn new(role: PeerRole) -> Self {
        QuorumPeer {
            permanent_uuid: None,
            last_known_addr: None,
            role,
        }
    }

    pub fn with_addr(mut self, addr: HostPort) -> Self {
        self.last_known_addr = Some(addr);
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.permanent_uuid = Some(uuid.into());
        self
    }

    /// Short description used in log lines and error messages.
    pub fn describe(&self) -> String {
        let addr = self
            .last_known_addr
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "<no addr>".to_string());
        let uuid = self.permanent_uuid.as_deref().unwrap_or("<unresolved>");
        format!("{{uuid: {}, addr: {}, role: {}}}", uuid, addr, self.role)
    }
}

/// The ordered peer set for one tablet's replicated log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Quorum {
    pub seqno: i64,
    pub local: bool,
    pub peers: Vec<QuorumPeer>,
}

impl Quorum {
    /// A single-peer quorum that replicates nowhere.
    pub fn local_quorum(uuid: impl Into<String>, seqno: i64) -> Quorum {
        Quorum {
            seqno,
            local: true,
            peers: vec![QuorumPeer::new(PeerRole::Leader).with_uuid(uuid)],
        }
    }

    /// Role of the peer with `uuid`, if it is a member.
    pub fn role_of(&self, uuid: &str) -> Option<PeerRole> {
        self.peers
            .iter()
            .find(|p| p.permanent_uuid.as_deref() == Some(uuid))
            .map(|p| p.role)
    }

    pub fn count_role(&self, role: PeerRole) -> usize {
        self.peers.iter().filter(|p| p.role == role).count()
    }

    pub fn describe(&self) -> String {
        let peers: Vec<String> = self.peers.iter().map(|p| p.describe()).collect();
        format!(
            "seqno: {}, local: {}, peers: [{}]",
            self.seqno,
            self.local,
            peers.join(", ")
        )
    }
}

/// Checks the structural invariants of a committed quorum.
///
/// Fatal on: missing or duplicate UUIDs, a local quorum that is not exactly
/// one LEADER, a non-local quorum with more than one LEADER or with neither
/// a LEADER nor a CANDIDATE, or a non-local peer without an address.
pub fn verify_quorum(quorum: &Quorum) -> Result<()> {
    let mut seen = HashSet::new();
    for peer in &quorum.peers {
        match peer.permanent_uuid.as_deref() {
            None | Some("") => {
                return Err(TesseraError::illegal_state(format!(
                    "peer {} has no permanent uuid",
                    peer.describe()
                )))
            }
            Some(uuid) => {
                if !seen.insert(uuid.to_string()) {
                    return Err(TesseraError::illegal_state(format!(
                        "duplicate peer uuid {} in quorum",
                        uuid
                    )));
                }
            }
        }
    }

    if quorum.local {
        if quorum.peers.len() != 1 || quorum.peers[0].role != PeerRole::Leader {
            return Err(TesseraError::illegal_state(format!(
                "local quorum must have exactly one LEADER peer: {}",
                quorum.describe()
            )));
        }
        return Ok(());
    }

    for peer in &quorum.peers {
        if peer.last_known_addr.is_none() {
            return Err(TesseraError::illegal_state(format!(
                "peer {} in distributed quorum has no address",
                peer.describe()
            )));
        }
    }
    let leaders = quorum.count_role(PeerRole::Leader);
    if leaders > 1 {
        return Err(TesseraError::illegal_state(format!(
            "quorum has {} LEADER peers: {}",
            leaders,
            quorum.describe()
        )));
    }
    if leaders + quorum.count_role(PeerRole::Candidate) == 0 {
        return Err(TesseraError::illegal_state(format!(
            "quorum has neither a LEADER nor a CANDIDATE: {}",
            quorum.describe()
        )));
    }
    Ok(())
}
