//! Client-side write operations.

use crate::table::TesseraTable;
use std::fmt;
use std::sync::Arc;
use tessera_commons::row::PartialRow;
use tessera_commons::rpc::{RowOperation, RowOperationType};

/// One row mutation bound to its table.
///
/// Ownership transfers to the session on a successful apply; on failure the
/// caller gets the operation back for logging or retry.
pub struct WriteOp {
    table: Arc<TesseraTable>,
    op_type: RowOperationType,
    row: PartialRow,
}

impl WriteOp {
    pub(crate) fn new(table: Arc<TesseraTable>, op_type: RowOperationType) -> WriteOp {
        let row = PartialRow::new(Arc::clone(table.schema_ref()));
        WriteOp {
            table,
            op_type,
            row,
        }
    }

    pub fn table(&self) -> &Arc<TesseraTable> {
        &self.table
    }

    pub fn op_type(&self) -> RowOperationType {
        self.op_type
    }

    pub fn row(&self) -> &PartialRow {
        &self.row
    }

    /// Mutable access to the row for setting key and value columns.
    pub fn row_mut(&mut self) -> &mut PartialRow {
        &mut self.row
    }

    /// Bytes this operation accounts for against the session's mutation
    /// buffer space.
    pub fn size_in_buffer(&self) -> usize {
        self.row.size_bytes()
    }

    /// The wire form of this operation.
    pub fn to_row_operation(&self) -> RowOperation {
        RowOperation {
            op_type: self.op_type,
            columns: self.row.clone().into_values(),
        }
    }
}

impl fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteOp")
            .field("table", &self.table.name())
            .field("op_type", &self.op_type)
            .field("row", &self.row)
            .finish()
    }
}
