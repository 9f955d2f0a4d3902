//! Logical catalog entities: tables and tablets.
//!
//! Each entity keeps a dirty/committed pair of metadata descriptors.
//! Mutations stage into the dirty side; once the catalog write is durably
//! acknowledged the caller commits, atomically replacing the committed side.

use bincode::{Decode, Encode};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tessera_commons::ids::{TableId, TabletId};
use tessera_commons::schema::Schema;

/// Lifecycle state of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum TableState {
    Preparing,
    Running,
    Altering,
    Removed,
}

/// The descriptor persisted in the catalog's `metadata` column for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TableMetadata {
    pub name: String,
    pub version: u64,
    pub schema: Schema,
    pub state: TableState,
}

/// Lifecycle state of a tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum TabletState {
    Preparing,
    Creating,
    Running,
    Replaced,
}

/// The descriptor persisted in the catalog's `metadata` column for a tablet.
///
/// The parent table id lives here rather than in the row key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TabletMetadata {
    pub table_id: TableId,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub state: TabletState,
}

/// A dirty/committed descriptor pair.
///
/// `dirty()` reads the staged side when present, otherwise the committed
/// side; `mutate_dirty()` stages a copy on first use.
#[derive(Debug)]
pub struct MetadataCow<T> {
    committed: T,
    dirty: Option<T>,
}

impl<T: Clone> MetadataCow<T> {
    pub fn new(committed: T) -> Self {
        MetadataCow {
            committed,
            dirty: None,
        }
    }

    pub fn committed(&self) -> &T {
        &self.committed
    }

    pub fn dirty(&self) -> &T {
        self.dirty.as_ref().unwrap_or(&self.committed)
    }

    pub fn has_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Stages a mutable copy of the committed descriptor on first use.
    pub fn mutate_dirty(&mut self) -> &mut T {
        if self.dirty.is_none() {
            self.dirty = Some(self.committed.clone());
        }
        self.dirty.as_mut().expect("dirty staged above")
    }

    /// Atomically replaces the committed side with the staged one.
    pub fn commit_dirty(&mut self) {
        if let Some(dirty) = self.dirty.take() {
            self.committed = dirty;
        }
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = None;
    }
}

/// A logical table known to the catalog.
#[derive(Debug)]
pub struct TableInfo {
    table_id: TableId,
    metadata: RwLock<MetadataCow<TableMetadata>>,
}

impl TableInfo {
    pub fn new(table_id: TableId, metadata: TableMetadata) -> TableInfo {
        TableInfo {
            table_id,
            metadata: RwLock::new(MetadataCow::new(metadata)),
        }
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    pub fn committed_metadata(&self) -> TableMetadata {
        self.metadata.read().committed().clone()
    }

    /// The descriptor a catalog write should persist: staged if present.
    pub fn dirty_metadata(&self) -> TableMetadata {
        self.metadata.read().dirty().clone()
    }

    pub fn has_dirty(&self) -> bool {
        self.metadata.read().has_dirty()
    }

    /// Stages a mutation into the dirty side.
    pub fn mutate<F: FnOnce(&mut TableMetadata)>(&self, f: F) {
        f(self.metadata.write().mutate_dirty());
    }

    /// Publishes the staged descriptor after catalog persistence succeeded.
    pub fn commit(&self) {
        self.metadata.write().commit_dirty();
    }

    pub fn clear_dirty(&self) {
        self.metadata.write().clear_dirty();
    }
}

/// A logical tablet known to the catalog.
#[derive(Debug)]
pub struct TabletInfo {
    tablet_id: TabletId,
    metadata: RwLock<MetadataCow<TabletMetadata>>,
}

impl TabletInfo {
    pub fn new(tablet_id: TabletId, metadata: TabletMetadata) -> TabletInfo {
        TabletInfo {
            tablet_id,
            metadata: RwLock::new(MetadataCow::new(metadata)),
        }
    }

    pub fn tablet_id(&self) -> &TabletId {
        &self.tablet_id
    }

    pub fn table_id(&self) -> TableId {
        self.metadata.read().dirty().table_id.clone()
    }

    pub fn committed_metadata(&self) -> TabletMetadata {
        self.metadata.read().committed().clone()
    }

    pub fn dirty_metadata(&self) -> TabletMetadata {
        self.metadata.read().dirty().clone()
    }

    pub fn has_dirty(&self) -> bool {
        self.metadata.read().has_dirty()
    }

    pub fn mutate<F: FnOnce(&mut TabletMetadata)>(&self, f: F) {
        f(self.metadata.write().mutate_dirty());
    }

    pub fn commit(&self) {
        self.metadata.write().commit_dirty();
    }

    pub fn clear_dirty(&self) {
        self.metadata.write().clear_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_commons::schema::{DataType, SchemaBuilder};

    fn table_metadata(name: &str) -> TableMetadata {
        TableMetadata {
            name: name.to_string(),
            version: 0,
            schema: SchemaBuilder::new()
                .add_key_column("k", DataType::String)
                .build()
                .unwrap(),
            state: TableState::Preparing,
        }
    }

    #[test]
    fn test_dirty_falls_back_to_committed() {
        let info = TableInfo::new(TableId::new("t1"), table_metadata("orders"));
        assert_eq!(info.dirty_metadata(), info.committed_metadata());
        assert!(!info.has_dirty());
    }

    #[test]
    fn test_mutation_stages_until_commit() {
        let info = TableInfo::new(TableId::new("t1"), table_metadata("orders"));
        info.mutate(|m| {
            m.state = TableState::Running;
            m.version += 1;
        });

        assert!(info.has_dirty());
        assert_eq!(info.committed_metadata().state, TableState::Preparing);
        assert_eq!(info.dirty_metadata().state, TableState::Running);

        info.commit();
        assert!(!info.has_dirty());
        assert_eq!(info.committed_metadata().state, TableState::Running);
        assert_eq!(info.committed_metadata().version, 1);
    }

    #[test]
    fn test_clear_dirty_abandons_staged_change() {
        let info = TableInfo::new(TableId::new("t1"), table_metadata("orders"));
        info.mutate(|m| m.state = TableState::Removed);
        info.clear_dirty();
        assert_eq!(info.dirty_metadata().state, TableState::Preparing);
    }

    #[test]
    fn test_tablet_info_table_id() {
        let info = TabletInfo::new(
            TabletId::new("p1"),
            TabletMetadata {
                table_id: TableId::new("t1"),
                start_key: Vec::new(),
                end_key: Vec::new(),
                state: TabletState::Preparing,
            },
        );
        assert_eq!(info.table_id(), TableId::new("t1"));
    }
}
