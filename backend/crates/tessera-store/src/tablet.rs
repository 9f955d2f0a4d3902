//! The in-memory tablet row store and its batched write executor.
//!
//! Rows are kept in a BTreeMap keyed by the memcmp encoding of the key
//! columns, so iteration is always in ascending key order. A write batch is
//! validated in full before anything is applied: either every row in the
//! batch commits or none do. Callers rely on this to batch correlated
//! updates.

use crate::tablet_meta::TabletMeta;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tessera_commons::error::TesseraError;
use tessera_commons::key_encoding::encode_row_key;
use tessera_commons::row::ColumnValue;
use tessera_commons::rpc::{PerRowError, RowOperation, RowOperationType, WriteRequest, WriteResponse};
use tessera_commons::schema::Schema;

/// Rows are delivered to scanners in blocks of up to this many rows.
pub const ROW_BLOCK_SIZE: usize = 512;

/// Dense cell values in schema column order.
pub type RowData = Vec<Option<ColumnValue>>;

/// Inclusive range predicate over a single column.
#[derive(Debug, Clone)]
pub struct ColumnRangePredicate {
    pub column_index: usize,
    pub lower: ColumnValue,
    pub upper: ColumnValue,
}

impl ColumnRangePredicate {
    pub fn equality(column_index: usize, value: ColumnValue) -> Self {
        ColumnRangePredicate {
            column_index,
            lower: value.clone(),
            upper: value,
        }
    }

    fn selects(&self, row: &[Option<ColumnValue>]) -> bool {
        match row.get(self.column_index).and_then(|v| v.as_ref()) {
            Some(v) => {
                v.compare_same_type(&self.lower).map_or(false, |o| o.is_ge())
                    && v.compare_same_type(&self.upper).map_or(false, |o| o.is_le())
            }
            None => false,
        }
    }
}

/// What a scan should return.
#[derive(Debug, Clone, Default)]
pub struct ScanSpec {
    pub predicate: Option<ColumnRangePredicate>,
}

impl ScanSpec {
    pub fn with_predicate(predicate: ColumnRangePredicate) -> Self {
        ScanSpec {
            predicate: Some(predicate),
        }
    }
}

/// Iterator over a snapshot of a tablet's rows, in ascending key order.
pub struct RowIter {
    rows: Vec<RowData>,
    pos: usize,
}

impl RowIter {
    pub fn has_next(&self) -> bool {
        self.pos < self.rows.len()
    }

    /// The next block of up to [`ROW_BLOCK_SIZE`] rows.
    pub fn next_block(&mut self) -> Option<&[RowData]> {
        if self.pos >= self.rows.len() {
            return None;
        }
        let start = self.pos;
        let end = (start + ROW_BLOCK_SIZE).min(self.rows.len());
        self.pos = end;
        Some(&self.rows[start..end])
    }
}

/// One hosted tablet.
pub struct Tablet {
    meta: Arc<TabletMeta>,
    schema: Arc<Schema>,
    rows: RwLock<BTreeMap<Vec<u8>, RowData>>,
}

impl Tablet {
    pub fn new(meta: Arc<TabletMeta>) -> Tablet {
        let schema = Arc::new(meta.schema().clone());
        Tablet {
            meta,
            schema,
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn meta(&self) -> &TabletMeta {
        &self.meta
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Applies a batched write. The batch is all-or-nothing: any per-row
    /// validation failure rejects the whole batch.
    pub fn apply_write_batch(&self, req: &WriteRequest) -> WriteResponse {
        if req.schema != *self.schema {
            return WriteResponse::tablet_error(TesseraError::corruption(format!(
                "unexpected schema for tablet {}: got {}, have {}",
                self.meta.tablet_id(),
                req.schema,
                self.schema
            )));
        }

        let rows = self.rows.read();
        let mut per_row_errors = Vec::new();
        let mut keys = Vec::with_capacity(req.row_operations.len());
        // Net effect of earlier ops in this batch, for existence checks.
        let mut batch_inserted: HashSet<Vec<u8>> = HashSet::new();
        let mut batch_deleted: HashSet<Vec<u8>> = HashSet::new();

        for (i, op) in req.row_operations.iter().enumerate() {
            match self.validate_op(op, &rows, &mut batch_inserted, &mut batch_deleted) {
                Ok(key) => keys.push(Some(key)),
                Err(e) => {
                    keys.push(None);
                    per_row_errors.push(PerRowError {
                        row_index: i as u32,
                        error: e,
                    });
                }
            }
        }
        drop(rows);

        if !per_row_errors.is_empty() {
            return WriteResponse {
                error: None,
                per_row_errors,
            };
        }

        let mut rows = self.rows.write();
        for (op, key) in req.row_operations.iter().zip(keys) {
            let key = key.expect("validated op has a key");
            match op.op_type {
                RowOperationType::Insert => {
                    rows.insert(key, op.columns.clone());
                }
                RowOperationType::Update => {
                    let existing = rows.get_mut(&key).expect("validated update target");
                    for (idx, value) in op.columns.iter().enumerate().skip(self.schema.num_key_columns()) {
                        if value.is_some() {
                            existing[idx] = value.clone();
                        }
                    }
                }
                RowOperationType::Delete => {
                    rows.remove(&key);
                }
            }
        }
        WriteResponse::ok()
    }

    fn validate_op(
        &self,
        op: &RowOperation,
        rows: &BTreeMap<Vec<u8>, RowData>,
        batch_inserted: &mut HashSet<Vec<u8>>,
        batch_deleted: &mut HashSet<Vec<u8>>,
    ) -> Result<Vec<u8>, TesseraError> {
        if op.columns.len() != self.schema.num_columns() {
            return Err(TesseraError::invalid_argument(format!(
                "row has {} columns, schema has {}",
                op.columns.len(),
                self.schema.num_columns()
            )));
        }
        for (idx, value) in op.columns.iter().enumerate() {
            if let Some(v) = value {
                let expected = self.schema.column(idx).data_type;
                if v.data_type() != expected {
                    return Err(TesseraError::invalid_argument(format!(
                        "column '{}' has type {}, got {}",
                        self.schema.column(idx).name,
                        expected,
                        v.data_type()
                    )));
                }
            }
        }

        let key = encode_row_key(&self.schema, &op.columns)?;
        let exists = (rows.contains_key(&key) && !batch_deleted.contains(&key))
            || batch_inserted.contains(&key);
        match op.op_type {
            RowOperationType::Insert => {
                if exists {
                    return Err(TesseraError::already_present("key already present"));
                }
                batch_inserted.insert(key.clone());
                batch_deleted.remove(&key);
            }
            RowOperationType::Update => {
                if !exists {
                    return Err(TesseraError::not_found("key not found"));
                }
            }
            RowOperationType::Delete => {
                if !exists {
                    return Err(TesseraError::not_found("key not found"));
                }
                batch_deleted.insert(key.clone());
                batch_inserted.remove(&key);
            }
        }
        Ok(key)
    }

    /// A snapshot iterator over the rows selected by `spec`, ascending by key.
    pub fn new_row_iterator(&self, spec: ScanSpec) -> RowIter {
        let rows = self.rows.read();
        let selected = rows
            .values()
            .filter(|row| spec.predicate.as_ref().map_or(true, |p| p.selects(row)))
            .cloned()
            .collect();
        RowIter {
            rows: selected,
            pos: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_manager::FsManager;
    use crate::tablet_meta::{BootstrapState, TabletMasterBlock};
    use tempfile::TempDir;
    use tessera_commons::ids::TabletId;
    use tessera_commons::schema::{DataType, SchemaBuilder};

    fn test_schema() -> Schema {
        SchemaBuilder::new()
            .add_key_column("type", DataType::UInt8)
            .add_key_column("id", DataType::Binary)
            .add_column("payload", DataType::Binary)
            .build()
            .unwrap()
    }

    fn test_tablet(dir: &TempDir) -> Tablet {
        let fs = Arc::new(FsManager::create_new(dir.path()).unwrap());
        let meta = TabletMeta::create_new(
            fs,
            TabletMasterBlock {
                tablet_id: TabletId::new("tablet-1"),
                block_a: "a".into(),
                block_b: "b".into(),
            },
            "test-table",
            test_schema(),
            Vec::new(),
            Vec::new(),
            BootstrapState::RemoteBootstrapDone,
        )
        .unwrap();
        Tablet::new(Arc::new(meta))
    }

    fn row(entry_type: u8, id: &[u8], payload: Option<&[u8]>) -> RowData {
        vec![
            Some(ColumnValue::UInt8(entry_type)),
            Some(ColumnValue::Binary(id.to_vec())),
            payload.map(|p| ColumnValue::Binary(p.to_vec())),
        ]
    }

    fn write(tablet: &Tablet, ops: Vec<(RowOperationType, RowData)>) -> WriteResponse {
        let mut req = WriteRequest::new(tablet.meta().tablet_id().clone(), test_schema());
        for (op_type, columns) in ops {
            req.add_operation(op_type, columns);
        }
        tablet.apply_write_batch(&req)
    }

    #[test]
    fn test_insert_update_delete() {
        let dir = TempDir::new().unwrap();
        let tablet = test_tablet(&dir);

        let resp = write(
            &tablet,
            vec![(RowOperationType::Insert, row(0, b"t1", Some(b"v1")))],
        );
        assert!(!resp.has_errors());
        assert_eq!(tablet.row_count(), 1);

        let resp = write(
            &tablet,
            vec![(RowOperationType::Update, row(0, b"t1", Some(b"v2")))],
        );
        assert!(!resp.has_errors());

        let mut iter = tablet.new_row_iterator(ScanSpec::default());
        let block = iter.next_block().unwrap();
        assert_eq!(block[0][2], Some(ColumnValue::Binary(b"v2".to_vec())));

        let resp = write(&tablet, vec![(RowOperationType::Delete, row(0, b"t1", None))]);
        assert!(!resp.has_errors());
        assert_eq!(tablet.row_count(), 0);
    }

    #[test]
    fn test_schema_mismatch_is_tablet_error() {
        let dir = TempDir::new().unwrap();
        let tablet = test_tablet(&dir);
        let other_schema = SchemaBuilder::new()
            .add_key_column("k", DataType::String)
            .build()
            .unwrap();
        let req = WriteRequest::new(tablet.meta().tablet_id().clone(), other_schema);
        let resp = tablet.apply_write_batch(&req);
        assert!(matches!(resp.error, Some(TesseraError::Corruption(_))));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let dir = TempDir::new().unwrap();
        let tablet = test_tablet(&dir);
        write(
            &tablet,
            vec![(RowOperationType::Insert, row(0, b"t1", Some(b"v")))],
        );

        // Second op collides; the first op in the batch must not land.
        let resp = write(
            &tablet,
            vec![
                (RowOperationType::Insert, row(0, b"t2", Some(b"v"))),
                (RowOperationType::Insert, row(0, b"t1", Some(b"v"))),
            ],
        );
        assert_eq!(resp.per_row_errors.len(), 1);
        assert_eq!(resp.per_row_errors[0].row_index, 1);
        assert!(resp.per_row_errors[0].error.is_already_present());
        assert_eq!(tablet.row_count(), 1);
    }

    #[test]
    fn test_batch_sees_earlier_ops() {
        let dir = TempDir::new().unwrap();
        let tablet = test_tablet(&dir);
        // Insert then update of the same key within one batch is valid.
        let resp = write(
            &tablet,
            vec![
                (RowOperationType::Insert, row(1, b"p1", Some(b"old"))),
                (RowOperationType::Update, row(1, b"p1", Some(b"new"))),
            ],
        );
        assert!(!resp.has_errors());

        let mut iter = tablet.new_row_iterator(ScanSpec::default());
        let block = iter.next_block().unwrap();
        assert_eq!(block[0][2], Some(ColumnValue::Binary(b"new".to_vec())));
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let dir = TempDir::new().unwrap();
        let tablet = test_tablet(&dir);
        let resp = write(
            &tablet,
            vec![(RowOperationType::Update, row(0, b"ghost", Some(b"v")))],
        );
        assert_eq!(resp.per_row_errors.len(), 1);
        assert!(resp.per_row_errors[0].error.is_not_found());
    }

    #[test]
    fn test_scan_with_predicate_in_key_order() {
        let dir = TempDir::new().unwrap();
        let tablet = test_tablet(&dir);
        write(
            &tablet,
            vec![
                (RowOperationType::Insert, row(1, b"p2", Some(b"x"))),
                (RowOperationType::Insert, row(0, b"t1", Some(b"x"))),
                (RowOperationType::Insert, row(1, b"p1", Some(b"x"))),
            ],
        );

        let spec = ScanSpec::with_predicate(ColumnRangePredicate::equality(
            0,
            ColumnValue::UInt8(1),
        ));
        let mut iter = tablet.new_row_iterator(spec);
        let block = iter.next_block().unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block[0][1], Some(ColumnValue::Binary(b"p1".to_vec())));
        assert_eq!(block[1][1], Some(ColumnValue::Binary(b"p2".to_vec())));
        assert!(!iter.has_next());
    }
}
