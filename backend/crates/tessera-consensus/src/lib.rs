//! Tessera consensus layer.
//!
//! Models quorum configurations, persists the committed quorum per tablet,
//! resolves peer identities at bootstrap, and defines the tablet-peer write
//! executor that the catalog and tablet servers submit through.

pub mod consensus_meta;
pub mod peer;
pub mod quorum;
pub mod resolver;

pub use consensus_meta::{ConsensusMeta, MINIMUM_TERM};
pub use peer::{LocalTabletPeer, QuorumChangeCallback, TabletPeer, WriteCompletionCallback};
pub use quorum::{verify_quorum, PeerRole, Quorum, QuorumPeer};
pub use resolver::{resolve_peer_uuids, PeerUuidResolver, StaticPeerResolver};
