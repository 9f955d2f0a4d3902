//! The client core: one connection handle per process.
//!
//! A [`TesseraClient`] holds the infrastructure that is not table-specific:
//! the messenger, the DNS resolver, the location cache, and the master
//! proxy. Applications typically create one per process, but nothing is
//! global: different client instances share no state and no connections.
//!
//! Data access goes through sessions created with
//! [`TesseraClient::new_session`]; a client may have any number of live
//! sessions.
//!
//! This type is thread-safe.

use crate::dns::DnsResolver;
use crate::meta_cache::MetaCache;
use crate::proxy::{MasterProxy, Messenger, TabletServerProxy};
use crate::session::Session;
use crate::table::TesseraTable;
use std::sync::Arc;
use std::time::Duration;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::host_port::HostPort;
use tessera_commons::ids::TabletId;
use tessera_commons::schema::Schema;

/// Options for [`TesseraClient::create`].
#[derive(Debug, Clone)]
pub struct TesseraClientOptions {
    /// The RPC address of the master. When the master is replicated this
    /// becomes a list of addresses.
    pub master_server_addr: String,
    /// Default per-call timeout inherited by new sessions.
    pub default_timeout: Duration,
}

impl Default for TesseraClientOptions {
    fn default() -> Self {
        TesseraClientOptions {
            master_server_addr: "127.0.0.1:7051".to_string(),
            default_timeout: Duration::from_secs(10),
        }
    }
}

impl TesseraClientOptions {
    pub fn new(master_server_addr: impl Into<String>) -> Self {
        TesseraClientOptions {
            master_server_addr: master_server_addr.into(),
            ..TesseraClientOptions::default()
        }
    }
}

/// A connection to a Tessera cluster.
pub struct TesseraClient {
    options: TesseraClientOptions,
    messenger: Arc<dyn Messenger>,
    dns_resolver: DnsResolver,
    master_proxy: Arc<dyn MasterProxy>,
    meta_cache: Arc<MetaCache>,
}

impl std::fmt::Debug for TesseraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TesseraClient")
            .field("options", &self.options)
            .finish()
    }
}

impl TesseraClient {
    /// One-shot initialization: resolves the master address and opens a
    /// durable proxy to it. Any failure is returned as a status.
    pub async fn create(
        options: TesseraClientOptions,
        messenger: Arc<dyn Messenger>,
    ) -> Result<Arc<TesseraClient>> {
        let master_addr: HostPort = options
            .master_server_addr
            .parse()
            .map_err(|e: TesseraError| e.prepend("bad master_server_addr"))?;

        let dns_resolver = DnsResolver::new();
        dns_resolver.resolve(&master_addr).await?;

        let master_proxy = messenger.master_proxy(&master_addr).await?;
        let meta_cache = Arc::new(MetaCache::new(Arc::clone(&master_proxy)));

        Ok(Arc::new(TesseraClient {
            options,
            messenger,
            dns_resolver,
            master_proxy,
            meta_cache,
        }))
    }

    /// Opens the named table.
    ///
    /// The schema is supplied by the caller as a stand-in until the client
    /// fetches it from the catalog.
    pub async fn open_table(
        self: &Arc<Self>,
        table_name: &str,
        schema: Schema,
    ) -> Result<Arc<TesseraTable>> {
        let table_id = self.master_proxy.open_table(table_name).await?;
        Ok(Arc::new(TesseraTable::new(
            Arc::clone(self),
            table_name,
            table_id,
            Arc::new(schema),
        )))
    }

    /// Creates a new session. Fully local: no RPCs, no blocking.
    pub fn new_session(self: &Arc<Self>) -> Session {
        Session::new(Arc::clone(self))
    }

    /// Advanced path: a proxy to the server hosting `tablet_id`. Routing
    /// through the meta cache replaces this for normal traffic.
    pub async fn tablet_proxy(&self, tablet_id: &TabletId) -> Result<Arc<dyn TabletServerProxy>> {
        let addr = self.master_proxy.get_tablet_location(tablet_id).await?;
        self.messenger.tablet_server_proxy(&addr).await
    }

    pub fn options(&self) -> &TesseraClientOptions {
        &self.options
    }

    pub fn messenger(&self) -> &Arc<dyn Messenger> {
        &self.messenger
    }

    /// The master proxy. Returned by value: the master may move, in which
    /// case the stored proxy gets swapped out.
    pub fn master_proxy(&self) -> Arc<dyn MasterProxy> {
        Arc::clone(&self.master_proxy)
    }

    pub fn meta_cache(&self) -> &Arc<MetaCache> {
        &self.meta_cache
    }

    pub fn dns_resolver(&self) -> &DnsResolver {
        &self.dns_resolver
    }
}
