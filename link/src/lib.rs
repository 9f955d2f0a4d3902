//! Tessera client library.
//!
//! The client core ([`TesseraClient`]) is a per-process connection handle:
//! messenger, DNS resolver, location cache, and master proxy. Writes go
//! through buffered [`Session`]s with three flush modes, per-row error
//! accumulation, and bounded buffer backpressure.

pub mod client;
pub mod dns;
pub mod error_collector;
pub mod meta_cache;
pub mod proxy;
pub mod session;
pub mod table;
pub mod write_op;

pub use client::{TesseraClient, TesseraClientOptions};
pub use dns::DnsResolver;
pub use error_collector::{ErrorCollector, PendingError, MAX_PENDING_ERRORS};
pub use meta_cache::MetaCache;
pub use proxy::{MasterProxy, Messenger, TableLocations, TabletLocation, TabletServerProxy};
pub use session::{FlushMode, RejectedOp, Session, DEFAULT_MUTATION_BUFFER_SPACE};
pub use table::TesseraTable;
pub use write_op::WriteOp;
