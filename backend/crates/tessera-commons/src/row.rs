//! Partial rows: the value container for client writes and tablet storage.
//!
//! A [`PartialRow`] is bound to a schema and holds a subset of that schema's
//! columns. DELETE operations only need the key columns; INSERT and UPDATE
//! carry keys plus values.

use crate::error::{Result, TesseraError};
use crate::schema::{DataType, Schema};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum ColumnValue {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    String(String),
    Binary(Vec<u8>),
}

impl ColumnValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnValue::Int8(_) => DataType::Int8,
            ColumnValue::UInt8(_) => DataType::UInt8,
            ColumnValue::Int16(_) => DataType::Int16,
            ColumnValue::Int32(_) => DataType::Int32,
            ColumnValue::Int64(_) => DataType::Int64,
            ColumnValue::String(_) => DataType::String,
            ColumnValue::Binary(_) => DataType::Binary,
        }
    }

    /// Approximate heap + inline size, used for mutation-buffer accounting.
    pub fn size_bytes(&self) -> usize {
        match self {
            ColumnValue::Int8(_) | ColumnValue::UInt8(_) => 1,
            ColumnValue::Int16(_) => 2,
            ColumnValue::Int32(_) => 4,
            ColumnValue::Int64(_) => 8,
            ColumnValue::String(s) => s.len(),
            ColumnValue::Binary(b) => b.len(),
        }
    }

    /// Compares two values of the same type. None if the types differ.
    pub fn compare_same_type(&self, other: &ColumnValue) -> Option<Ordering> {
        match (self, other) {
            (ColumnValue::Int8(a), ColumnValue::Int8(b)) => Some(a.cmp(b)),
            (ColumnValue::UInt8(a), ColumnValue::UInt8(b)) => Some(a.cmp(b)),
            (ColumnValue::Int16(a), ColumnValue::Int16(b)) => Some(a.cmp(b)),
            (ColumnValue::Int32(a), ColumnValue::Int32(b)) => Some(a.cmp(b)),
            (ColumnValue::Int64(a), ColumnValue::Int64(b)) => Some(a.cmp(b)),
            (ColumnValue::String(a), ColumnValue::String(b)) => Some(a.cmp(b)),
            (ColumnValue::Binary(a), ColumnValue::Binary(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// A row with a subset of its schema's columns set.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRow {
    schema: Arc<Schema>,
    values: Vec<Option<ColumnValue>>,
}

impl PartialRow {
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = vec![None; schema.num_columns()];
        PartialRow { schema, values }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Sets a column by name, checking the value against the column type.
    pub fn set(&mut self, column: &str, value: ColumnValue) -> Result<()> {
        let idx = self.schema.find_column(column).ok_or_else(|| {
            TesseraError::invalid_argument(format!("unknown column '{}'", column))
        })?;
        let expected = self.schema.column(idx).data_type;
        if value.data_type() != expected {
            return Err(TesseraError::invalid_argument(format!(
                "column '{}' has type {}, got {}",
                column,
                expected,
                value.data_type()
            )));
        }
        self.values[idx] = Some(value);
        Ok(())
    }

    pub fn set_int8(&mut self, column: &str, v: i8) -> Result<()> {
        self.set(column, ColumnValue::Int8(v))
    }

    pub fn set_uint8(&mut self, column: &str, v: u8) -> Result<()> {
        self.set(column, ColumnValue::UInt8(v))
    }

    pub fn set_int16(&mut self, column: &str, v: i16) -> Result<()> {
        self.set(column, ColumnValue::Int16(v))
    }

    pub fn set_int32(&mut self, column: &str, v: i32) -> Result<()> {
        self.set(column, ColumnValue::Int32(v))
    }

    pub fn set_int64(&mut self, column: &str, v: i64) -> Result<()> {
        self.set(column, ColumnValue::Int64(v))
    }

    pub fn set_string(&mut self, column: &str, v: impl Into<String>) -> Result<()> {
        self.set(column, ColumnValue::String(v.into()))
    }

    pub fn set_binary(&mut self, column: &str, v: impl Into<Vec<u8>>) -> Result<()> {
        self.set(column, ColumnValue::Binary(v.into()))
    }

    pub fn get(&self, idx: usize) -> Option<&ColumnValue> {
        self.values.get(idx).and_then(|v| v.as_ref())
    }

    /// True iff every key column is set.
    pub fn is_key_set(&self) -> bool {
        self.values[..self.schema.num_key_columns()]
            .iter()
            .all(|v| v.is_some())
    }

    /// The memcmp-ordered encoding of this row's key columns.
    pub fn encoded_key(&self) -> Result<Vec<u8>> {
        crate::key_encoding::encode_row_key(&self.schema, &self.values)
    }

    /// Approximate size of the set cells, for buffer accounting.
    pub fn size_bytes(&self) -> usize {
        self.values
            .iter()
            .flatten()
            .map(|v| v.size_bytes())
            .sum()
    }

    /// Consumes the row into its dense per-column values, for the wire.
    pub fn into_values(self) -> Vec<Option<ColumnValue>> {
        self.values
    }

    pub fn values(&self) -> &[Option<ColumnValue>] {
        &self.values
    }
}
