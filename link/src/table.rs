//! Table handles.

use crate::client::TesseraClient;
use crate::write_op::WriteOp;
use std::sync::Arc;
use tessera_commons::ids::TableId;
use tessera_commons::rpc::RowOperationType;
use tessera_commons::schema::Schema;

/// A table on a particular cluster, bound to the client that opened it.
///
/// Holds the table's schema for building operations. Thread-safe.
pub struct TesseraTable {
    client: Arc<TesseraClient>,
    name: String,
    table_id: TableId,
    schema: Arc<Schema>,
}

impl std::fmt::Debug for TesseraTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TesseraTable")
            .field("name", &self.name)
            .field("table_id", &self.table_id)
            .finish()
    }
}

impl TesseraTable {
    pub(crate) fn new(
        client: Arc<TesseraClient>,
        name: impl Into<String>,
        table_id: TableId,
        schema: Arc<Schema>,
    ) -> TesseraTable {
        TesseraTable {
            client,
            name: name.into(),
            table_id,
            schema,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_ref(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn client(&self) -> &Arc<TesseraClient> {
        &self.client
    }

    /// A new insertion for this table. Set the key and value columns on the
    /// returned operation, then apply it through a session.
    pub fn new_insert(self: &Arc<Self>) -> WriteOp {
        WriteOp::new(Arc::clone(self), RowOperationType::Insert)
    }

    pub fn new_update(self: &Arc<Self>) -> WriteOp {
        WriteOp::new(Arc::clone(self), RowOperationType::Update)
    }

    /// A new deletion; only the key columns need to be set.
    pub fn new_delete(self: &Arc<Self>) -> WriteOp {
        WriteOp::new(Arc::clone(self), RowOperationType::Delete)
    }
}
