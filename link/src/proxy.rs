//! RPC proxy seams.
//!
//! The actual transport (reactor pool, connection management, wire framing)
//! is an external collaborator; the client core only depends on these
//! traits. A [`Messenger`] opens proxies by address and is expected to pool
//! connections per client instance — different client instances never share
//! connections.

use async_trait::async_trait;
use std::sync::Arc;
use tessera_commons::error::Result;
use tessera_commons::host_port::HostPort;
use tessera_commons::ids::{TableId, TabletId};
use tessera_commons::rpc::{WriteRequest, WriteResponse};

/// Location of one tablet: its key range and the server hosting it.
#[derive(Debug, Clone, PartialEq)]
pub struct TabletLocation {
    pub tablet_id: TabletId,
    /// Inclusive lower bound of the key range; empty means unbounded.
    pub start_key: Vec<u8>,
    /// Exclusive upper bound of the key range; empty means unbounded.
    pub end_key: Vec<u8>,
    pub addr: HostPort,
}

impl TabletLocation {
    pub fn covers(&self, partition_key: &[u8]) -> bool {
        self.start_key.as_slice() <= partition_key
            && (self.end_key.is_empty() || partition_key < self.end_key.as_slice())
    }
}

/// All tablet locations of one table, sorted by start key.
#[derive(Debug, Clone, PartialEq)]
pub struct TableLocations {
    pub table_id: TableId,
    pub tablets: Vec<TabletLocation>,
}

/// Proxy to the master service.
#[async_trait]
pub trait MasterProxy: Send + Sync {
    /// Checks the named table exists and returns its id.
    async fn open_table(&self, table_name: &str) -> Result<TableId>;

    async fn get_table_locations(&self, table_id: &TableId) -> Result<TableLocations>;

    async fn get_tablet_location(&self, tablet_id: &TabletId) -> Result<HostPort>;
}

/// Proxy to one tablet server.
#[async_trait]
pub trait TabletServerProxy: Send + Sync {
    async fn write(&self, req: WriteRequest) -> Result<WriteResponse>;
}

/// Opens proxies by resolved address.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn master_proxy(&self, addr: &HostPort) -> Result<Arc<dyn MasterProxy>>;

    async fn tablet_server_proxy(&self, addr: &HostPort) -> Result<Arc<dyn TabletServerProxy>>;
}
