//! Memcmp-ordered encoding of composite row keys.
//!
//! The encoding sorts identically to the typed key tuple:
//! - fixed-width integers are written big-endian with the sign bit flipped;
//! - unsigned bytes are written raw;
//! - string/binary components are escaped (`0x00` -> `0x00 0x01`) and
//!   terminated with `0x00 0x00`, except the last component which is written
//!   raw since nothing follows it.
//!
//! Both the tablet store and the client's partition-key routing use this
//! encoding, so it lives in the commons crate.

use crate::error::{Result, TesseraError};
use crate::row::ColumnValue;
use crate::schema::Schema;

/// Encodes the key columns of a dense row against `schema`.
///
/// Every key column must be set; an unset key column is an error naming it.
pub fn encode_row_key(schema: &Schema, values: &[Option<ColumnValue>]) -> Result<Vec<u8>> {
    let num_keys = schema.num_key_columns();
    let mut out = Vec::new();
    for idx in 0..num_keys {
        let col = schema.column(idx);
        let value = values
            .get(idx)
            .and_then(|v| v.as_ref())
            .ok_or_else(|| {
                TesseraError::invalid_argument(format!(
                    "key column '{}' is not set",
                    col.name
                ))
            })?;
        if value.data_type() != col.data_type {
            return Err(TesseraError::invalid_argument(format!(
                "key column '{}' has type {}, got {}",
                col.name,
                col.data_type,
                value.data_type()
            )));
        }
        let is_last = idx + 1 == num_keys;
        encode_component(&mut out, value, is_last);
    }
    Ok(out)
}

fn encode_component(dst: &mut Vec<u8>, value: &ColumnValue, is_last: bool) {
    match value {
        ColumnValue::Int8(v) => dst.push((*v as u8) ^ 0x80),
        ColumnValue::UInt8(v) => dst.push(*v),
        ColumnValue::Int16(v) => {
            dst.extend_from_slice(&((*v as u16) ^ 0x8000).to_be_bytes())
        }
        ColumnValue::Int32(v) => {
            dst.extend_from_slice(&((*v as u32) ^ 0x8000_0000).to_be_bytes())
        }
        ColumnValue::Int64(v) => {
            dst.extend_from_slice(&((*v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes())
        }
        ColumnValue::String(s) => encode_bytes(dst, s.as_bytes(), is_last),
        ColumnValue::Binary(b) => encode_bytes(dst, b, is_last),
    }
}

fn encode_bytes(dst: &mut Vec<u8>, bytes: &[u8], is_last: bool) {
    if is_last {
        dst.extend_from_slice(bytes);
        return;
    }
    for &b in bytes {
        if b == 0x00 {
            dst.push(0x00);
            dst.push(0x01);
        } else {
            dst.push(b);
        }
    }
    dst.push(0x00);
    dst.push(0x00);
}
