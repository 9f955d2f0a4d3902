//! Host name resolution for client-side endpoints.

use std::net::SocketAddr;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::host_port::HostPort;

/// Thin wrapper over the runtime's resolver.
#[derive(Debug, Default)]
pub struct DnsResolver;

impl DnsResolver {
    pub fn new() -> DnsResolver {
        DnsResolver
    }

    /// Resolves `addr` to socket addresses. NetworkError names the address
    /// on failure or when nothing resolves.
    pub async fn resolve(&self, addr: &HostPort) -> Result<Vec<SocketAddr>> {
        let resolved: Vec<SocketAddr> =
            tokio::net::lookup_host((addr.host.as_str(), addr.port))
                .await
                .map_err(|e| {
                    TesseraError::network_error(format!("unable to resolve '{}': {}", addr, e))
                })?
                .collect();
        if resolved.is_empty() {
            return Err(TesseraError::network_error(format!(
                "'{}' resolved to no addresses",
                addr
            )));
        }
        Ok(resolved)
    }
}
