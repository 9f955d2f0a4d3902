//! Cache of table-to-tablet and tablet-to-server location lookups.
//!
//! Owned by the client core; sessions and scanners reach it through the
//! core. A miss fetches the whole table's locations from the master. When a
//! server reports a stale location, the caller invalidates the affected
//! entry and looks up again, which refetches.

use crate::proxy::{MasterProxy, TableLocations, TabletLocation};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::ids::{TableId, TabletId};

pub struct MetaCache {
    master: Arc<dyn MasterProxy>,
    tables: RwLock<HashMap<TableId, Arc<TableLocations>>>,
}

impl MetaCache {
    pub fn new(master: Arc<dyn MasterProxy>) -> MetaCache {
        MetaCache {
            master,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// The location of the tablet covering `partition_key`, fetching from
    /// the master on a cache miss.
    pub async fn lookup_tablet(
        &self,
        table_id: &TableId,
        partition_key: &[u8],
    ) -> Result<TabletLocation> {
        if let Some(location) = self.lookup_cached(table_id, partition_key) {
            return Ok(location);
        }

        let mut locations = self.master.get_table_locations(table_id).await?;
        locations.tablets.sort_by(|a, b| a.start_key.cmp(&b.start_key));
        log::debug!(
            "Fetched {} tablet locations for table {}",
            locations.tablets.len(),
            table_id
        );
        self.tables
            .write()
            .insert(table_id.clone(), Arc::new(locations));

        self.lookup_cached(table_id, partition_key).ok_or_else(|| {
            TesseraError::not_found(format!(
                "no tablet of table {} covers the partition key",
                table_id
            ))
        })
    }

    fn lookup_cached(&self, table_id: &TableId, partition_key: &[u8]) -> Option<TabletLocation> {
        let tables = self.tables.read();
        let locations = tables.get(table_id)?;
        locations
            .tablets
            .iter()
            .rev()
            .find(|t| t.start_key.as_slice() <= partition_key)
            .filter(|t| t.covers(partition_key))
            .cloned()
    }

    /// Drops the cached locations containing `tablet_id`, forcing the next
    /// lookup to refetch.
    pub fn invalidate_tablet(&self, table_id: &TableId, tablet_id: &TabletId) {
        let mut tables = self.tables.write();
        let stale = tables
            .get(table_id)
            .map_or(false, |l| l.tablets.iter().any(|t| &t.tablet_id == tablet_id));
        if stale {
            log::debug!(
                "Invalidating cached locations of table {} (stale tablet {})",
                table_id,
                tablet_id
            );
            tables.remove(table_id);
        }
    }

    pub fn invalidate_table(&self, table_id: &TableId) {
        self.tables.write().remove(table_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_commons::host_port::HostPort;

    struct CountingMaster {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl MasterProxy for CountingMaster {
        async fn open_table(&self, table_name: &str) -> Result<TableId> {
            Ok(TableId::new(table_name))
        }

        async fn get_table_locations(&self, table_id: &TableId) -> Result<TableLocations> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(TableLocations {
                table_id: table_id.clone(),
                tablets: vec![
                    TabletLocation {
                        tablet_id: TabletId::new("p2"),
                        start_key: b"m".to_vec(),
                        end_key: Vec::new(),
                        addr: HostPort::new("127.0.0.1", 7151),
                    },
                    TabletLocation {
                        tablet_id: TabletId::new("p1"),
                        start_key: Vec::new(),
                        end_key: b"m".to_vec(),
                        addr: HostPort::new("127.0.0.1", 7150),
                    },
                ],
            })
        }

        async fn get_tablet_location(&self, _tablet_id: &TabletId) -> Result<HostPort> {
            Err(TesseraError::not_found("unused"))
        }
    }

    #[tokio::test]
    async fn test_miss_fetches_then_hits_cache() {
        let master = Arc::new(CountingMaster {
            fetches: AtomicUsize::new(0),
        });
        let cache = MetaCache::new(Arc::clone(&master) as Arc<dyn MasterProxy>);
        let table = TableId::new("t");

        let loc = cache.lookup_tablet(&table, b"apple").await.unwrap();
        assert_eq!(loc.tablet_id, TabletId::new("p1"));
        let loc = cache.lookup_tablet(&table, b"zebra").await.unwrap();
        assert_eq!(loc.tablet_id, TabletId::new("p2"));
        assert_eq!(master.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let master = Arc::new(CountingMaster {
            fetches: AtomicUsize::new(0),
        });
        let cache = MetaCache::new(Arc::clone(&master) as Arc<dyn MasterProxy>);
        let table = TableId::new("t");

        cache.lookup_tablet(&table, b"a").await.unwrap();
        cache.invalidate_tablet(&table, &TabletId::new("p1"));
        cache.lookup_tablet(&table, b"a").await.unwrap();
        assert_eq!(master.fetches.load(Ordering::SeqCst), 2);

        // Invalidating an unknown tablet leaves the cache alone.
        cache.invalidate_tablet(&table, &TabletId::new("ghost"));
        cache.lookup_tablet(&table, b"a").await.unwrap();
        assert_eq!(master.fetches.load(Ordering::SeqCst), 2);
    }
}
