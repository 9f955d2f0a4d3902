//! Tessera storage layer.
//!
//! Provides the filesystem layout manager, durable tablet descriptors, and
//! the in-memory tablet row store that hosts the system catalog. The
//! columnar on-disk format lives elsewhere; this crate only carries what the
//! catalog and bootstrap paths need.

pub mod fs_manager;
pub mod tablet;
pub mod tablet_meta;
pub mod wal;

pub use fs_manager::FsManager;
pub use tablet::{ColumnRangePredicate, RowData, RowIter, ScanSpec, Tablet, ROW_BLOCK_SIZE};
pub use tablet_meta::{BootstrapState, TabletMasterBlock, TabletMeta};
pub use wal::WriteAheadLog;
