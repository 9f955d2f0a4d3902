//! Table schemas.
//!
//! A schema is an ordered list of columns with the key columns first. The
//! schema persisted in a tablet's metadata is the single source of truth for
//! that tablet; callers that expect a different schema must treat the
//! mismatch as fatal.

use crate::error::{Result, TesseraError};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column types supported by the catalog core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum DataType {
    Int8,
    UInt8,
    Int16,
    Int32,
    Int64,
    String,
    Binary,
}

impl DataType {
    /// Size of the encoded value for fixed-width types, None for var-length.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            DataType::Int8 | DataType::UInt8 => Some(1),
            DataType::Int16 => Some(2),
            DataType::Int32 => Some(4),
            DataType::Int64 => Some(8),
            DataType::String | DataType::Binary => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int8 => "int8",
            DataType::UInt8 => "uint8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::String => "string",
            DataType::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// One column of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub is_key: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType, is_key: bool) -> Self {
        ColumnSchema {
            name: name.into(),
            data_type,
            is_key,
        }
    }
}

/// An ordered set of columns, key columns first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Schema {
    columns: Vec<ColumnSchema>,
    num_key_columns: usize,
}

impl Schema {
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> &ColumnSchema {
        &self.columns[idx]
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_key_columns(&self) -> usize {
        self.num_key_columns
    }

    /// Index of the named column, if present.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// A schema containing only the key columns.
    pub fn key_projection(&self) -> Schema {
        Schema {
            columns: self.columns[..self.num_key_columns].to_vec(),
            num_key_columns: self.num_key_columns,
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", col.name, col.data_type)?;
            if col.is_key {
                write!(f, " KEY")?;
            }
        }
        write!(f, ")")
    }
}

/// Builder for [`Schema`]. Key columns always sort ahead of value columns
/// regardless of call order.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    key_columns: Vec<ColumnSchema>,
    value_columns: Vec<ColumnSchema>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        SchemaBuilder::default()
    }

    pub fn add_key_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.key_columns
            .push(ColumnSchema::new(name, data_type, true));
        self
    }

    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.value_columns
            .push(ColumnSchema::new(name, data_type, false));
        self
    }

    pub fn build(self) -> Result<Schema> {
        if self.key_columns.is_empty() {
            return Err(TesseraError::invalid_argument(
                "schema must have at least one key column",
            ));
        }
        let num_key_columns = self.key_columns.len();
        let mut columns = self.key_columns;
        columns.extend(self.value_columns);

        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(TesseraError::invalid_argument(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
        }

        Ok(Schema {
            columns,
            num_key_columns,
        })
    }
}
