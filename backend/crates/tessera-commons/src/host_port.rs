//! Host/port pairs as used in quorum configuration and client options.

use crate::error::TesseraError;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A network endpoint, host name or IP plus port.
///
/// Config files carry these as `"host:port"` strings; quorum metadata
/// persists them structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        HostPort {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostPort {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            TesseraError::invalid_argument(format!("expected host:port, got '{}'", s))
        })?;
        if host.is_empty() {
            return Err(TesseraError::invalid_argument(format!(
                "empty host in '{}'",
                s
            )));
        }
        let port = port.parse::<u16>().map_err(|_| {
            TesseraError::invalid_argument(format!("invalid port in '{}'", s))
        })?;
        Ok(HostPort::new(host, port))
    }
}
