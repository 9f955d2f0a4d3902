//! Tessera master.
//!
//! Hosts the system catalog: a replicated, self-hosted tablet whose rows
//! describe every table and tablet in the cluster. The catalog is mutated
//! through the same write path it describes, which makes bootstrap a
//! sequencing problem; see [`sys_catalog`].

pub mod entities;
pub mod master;
pub mod options;
pub mod sys_catalog;

pub use entities::{
    MetadataCow, TableInfo, TableMetadata, TableState, TabletInfo, TabletMetadata, TabletState,
};
pub use master::Master;
pub use options::{MasterConfig, MasterOptions};
pub use sys_catalog::{
    SysCatalog, TableVisitor, TabletVisitor, SYS_CATALOG_TABLET_ID, TABLES_ENTRY, TABLETS_ENTRY,
};
