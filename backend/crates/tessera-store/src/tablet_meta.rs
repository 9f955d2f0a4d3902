//! Durable tablet descriptors.
//!
//! A [`TabletMeta`] records everything needed to bring a tablet back up:
//! its schema, its on-disk block identifiers, and how far bootstrap got.
//! The schema stored here is the single source of truth; a caller expecting
//! a different schema must fail its load.

use crate::fs_manager::{read_file, FsManager};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::ids::TabletId;
use tessera_commons::schema::Schema;

/// How far a tablet's bootstrap has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum BootstrapState {
    New,
    Bootstrapping,
    RemoteBootstrapDone,
    Failed,
}

/// The well-known block assignment for a tablet, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct TabletMasterBlock {
    pub tablet_id: TabletId,
    pub block_a: String,
    pub block_b: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
struct TabletMetaRecord {
    master_block: TabletMasterBlock,
    table_name: String,
    schema: Schema,
    start_key: Vec<u8>,
    end_key: Vec<u8>,
    bootstrap_state: BootstrapState,
}

/// Durable descriptor for one tablet.
#[derive(Debug)]
pub struct TabletMeta {
    fs: Arc<FsManager>,
    record: TabletMetaRecord,
}

impl TabletMeta {
    /// Creates and persists the descriptor for a brand-new tablet.
    pub fn create_new(
        fs: Arc<FsManager>,
        master_block: TabletMasterBlock,
        table_name: impl Into<String>,
        schema: Schema,
        start_key: Vec<u8>,
        end_key: Vec<u8>,
        bootstrap_state: BootstrapState,
    ) -> Result<TabletMeta> {
        let meta = TabletMeta {
            fs,
            record: TabletMetaRecord {
                master_block,
                table_name: table_name.into(),
                schema,
                start_key,
                end_key,
                bootstrap_state,
            },
        };
        meta.flush()?;
        Ok(meta)
    }

    /// Loads an existing descriptor. NotFound if it was never created,
    /// Corruption if the persisted record does not decode.
    pub fn load(fs: Arc<FsManager>, tablet_id: &TabletId) -> Result<TabletMeta> {
        let path = fs.tablet_metadata_path(tablet_id);
        let bytes = read_file(&path)
            .map_err(|e| e.prepend(format!("unable to load tablet metadata for {}", tablet_id)))?;
        let (record, _): (TabletMetaRecord, _) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).map_err(|e| {
                TesseraError::corruption(format!(
                    "bad tablet metadata record for {}: {}",
                    tablet_id, e
                ))
            })?;
        Ok(TabletMeta { fs, record })
    }

    /// Atomically persists the current in-memory state.
    pub fn flush(&self) -> Result<()> {
        let bytes = bincode::encode_to_vec(&self.record, bincode::config::standard())?;
        let path = self.fs.tablet_metadata_path(self.tablet_id());
        self.fs.atomic_write(&path, &bytes)
    }

    pub fn tablet_id(&self) -> &TabletId {
        &self.record.master_block.tablet_id
    }

    pub fn master_block(&self) -> &TabletMasterBlock {
        &self.record.master_block
    }

    pub fn table_name(&self) -> &str {
        &self.record.table_name
    }

    pub fn schema(&self) -> &Schema {
        &self.record.schema
    }

    pub fn start_key(&self) -> &[u8] {
        &self.record.start_key
    }

    pub fn end_key(&self) -> &[u8] {
        &self.record.end_key
    }

    pub fn bootstrap_state(&self) -> BootstrapState {
        self.record.bootstrap_state
    }

    pub fn set_bootstrap_state(&mut self, state: BootstrapState) {
        self.record.bootstrap_state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tessera_commons::schema::{DataType, SchemaBuilder};

    fn schema() -> Schema {
        SchemaBuilder::new()
            .add_key_column("k", DataType::String)
            .add_column("v", DataType::Int64)
            .build()
            .unwrap()
    }

    fn master_block(id: &str) -> TabletMasterBlock {
        TabletMasterBlock {
            tablet_id: TabletId::new(id),
            block_a: "a-block".to_string(),
            block_b: "b-block".to_string(),
        }
    }

    #[test]
    fn test_create_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let fs = Arc::new(FsManager::create_new(dir.path()).unwrap());
        let meta = TabletMeta::create_new(
            Arc::clone(&fs),
            master_block("p1"),
            "orders",
            schema(),
            Vec::new(),
            Vec::new(),
            BootstrapState::RemoteBootstrapDone,
        )
        .unwrap();
        assert_eq!(meta.table_name(), "orders");

        let loaded = TabletMeta::load(fs, &TabletId::new("p1")).unwrap();
        assert_eq!(loaded.schema(), meta.schema());
        assert_eq!(loaded.bootstrap_state(), BootstrapState::RemoteBootstrapDone);
        assert_eq!(loaded.master_block(), meta.master_block());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let fs = Arc::new(FsManager::create_new(dir.path()).unwrap());
        let err = TabletMeta::load(fs, &TabletId::new("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_load_corrupt_record() {
        let dir = TempDir::new().unwrap();
        let fs = Arc::new(FsManager::create_new(dir.path()).unwrap());
        let id = TabletId::new("p1");
        std::fs::write(fs.tablet_metadata_path(&id), b"garbage").unwrap();
        let err = TabletMeta::load(fs, &id).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_bootstrap_state_survives_flush() {
        let dir = TempDir::new().unwrap();
        let fs = Arc::new(FsManager::create_new(dir.path()).unwrap());
        let mut meta = TabletMeta::create_new(
            Arc::clone(&fs),
            master_block("p2"),
            "t",
            schema(),
            Vec::new(),
            Vec::new(),
            BootstrapState::New,
        )
        .unwrap();
        meta.set_bootstrap_state(BootstrapState::Bootstrapping);
        meta.flush().unwrap();

        let loaded = TabletMeta::load(fs, &TabletId::new("p2")).unwrap();
        assert_eq!(loaded.bootstrap_state(), BootstrapState::Bootstrapping);
    }
}
