//! Shared Tessera types.
//!
//! Everything here is dependency-light and used on both sides of the wire:
//! the status taxonomy, typed ids, schemas and rows, the write envelope, the
//! memcmp key encoding, and the threading utilities the write paths run on.

pub mod error;
pub mod host_port;
pub mod ids;
pub mod key_encoding;
pub mod row;
pub mod rpc;
pub mod schema;
pub mod util;

pub use error::{Result, TesseraError};
pub use host_port::HostPort;
pub use ids::{TableId, TabletId};
pub use row::{ColumnValue, PartialRow};
pub use rpc::{PerRowError, RowOperation, RowOperationType, WriteRequest, WriteResponse};
pub use schema::{ColumnSchema, DataType, Schema, SchemaBuilder};
pub use util::arena::{Arena, ArenaSlice};
pub use util::threadpool::{ThreadPool, ThreadPoolBuilder};
