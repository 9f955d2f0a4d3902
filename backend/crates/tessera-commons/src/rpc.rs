//! The write RPC envelope shared by user tables and the system catalog.
//!
//! A request carries the full schema so the receiving tablet can validate it
//! against its own; row operations are dense per-column value vectors in
//! schema order.

use crate::error::TesseraError;
use crate::ids::TabletId;
use crate::row::ColumnValue;
use crate::schema::Schema;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Kind of a single row mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum RowOperationType {
    Insert,
    Update,
    Delete,
}

/// One row mutation. DELETE carries only the key columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct RowOperation {
    pub op_type: RowOperationType,
    /// Cell values in schema column order; `None` marks an unset column.
    pub columns: Vec<Option<ColumnValue>>,
}

/// A batched write addressed to one tablet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct WriteRequest {
    pub tablet_id: TabletId,
    pub schema: Schema,
    pub row_operations: Vec<RowOperation>,
}

impl WriteRequest {
    pub fn new(tablet_id: TabletId, schema: Schema) -> Self {
        WriteRequest {
            tablet_id,
            schema,
            row_operations: Vec::new(),
        }
    }

    pub fn add_operation(&mut self, op_type: RowOperationType, columns: Vec<Option<ColumnValue>>) {
        self.row_operations.push(RowOperation { op_type, columns });
    }
}

/// Failure of one row within a batch, by request index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct PerRowError {
    pub row_index: u32,
    pub error: TesseraError,
}

/// Result of a batched write.
///
/// A tablet-level `error` means nothing in the batch was applied. Per-row
/// errors also mean nothing was applied: the write executor validates the
/// whole batch before touching the tablet, so a batch is all-or-nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct WriteResponse {
    pub error: Option<TesseraError>,
    pub per_row_errors: Vec<PerRowError>,
}

impl WriteResponse {
    pub fn ok() -> Self {
        WriteResponse::default()
    }

    pub fn tablet_error(error: TesseraError) -> Self {
        WriteResponse {
            error: Some(error),
            per_row_errors: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error.is_some() || !self.per_row_errors.is_empty()
    }
}
