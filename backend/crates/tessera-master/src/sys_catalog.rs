//! The system catalog: a self-hosted tablet holding all table and tablet
//! metadata.
//!
//! Catalog rows are keyed `(entry_type, entry_id)` with `entry_type` leading
//! so all entries of one kind form a contiguous scan range. The catalog
//! mutates itself through the same replicated write path it describes:
//! every typed mutation below builds one write batch, submits it to the
//! catalog tablet's peer, and blocks until the quorum has durably committed
//! it.

use crate::entities::{TableInfo, TableMetadata, TabletInfo, TabletMetadata};
use crate::options::MasterOptions;
use parking_lot::RwLock;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::ids::TabletId;
use tessera_commons::row::{ColumnValue, PartialRow};
use tessera_commons::rpc::{RowOperationType, WriteRequest};
use tessera_commons::schema::{DataType, Schema, SchemaBuilder};
use tessera_commons::util::arena::Arena;
use tessera_commons::util::threadpool::{ThreadPool, ThreadPoolBuilder};
use tessera_consensus::consensus_meta::{ConsensusMeta, MINIMUM_TERM};
use tessera_consensus::peer::{LocalTabletPeer, TabletPeer};
use tessera_consensus::quorum::{verify_quorum, PeerRole, Quorum, QuorumPeer};
use tessera_consensus::resolver::{resolve_peer_uuids, PeerUuidResolver};
use tessera_store::fs_manager::FsManager;
use tessera_store::tablet::{ColumnRangePredicate, RowData, ScanSpec, Tablet};
use tessera_store::tablet_meta::{BootstrapState, TabletMasterBlock, TabletMeta};
use tessera_store::wal::WriteAheadLog;

/// Well-known id of the catalog tablet, fixed across the cluster.
pub const SYS_CATALOG_TABLET_ID: &str = "00000000000000000000000000000000";

const SYS_CATALOG_BLOCK_A: &str = "00000000000000000000000000000000";
const SYS_CATALOG_BLOCK_B: &str = "11111111111111111111111111111111";

const COL_ENTRY_TYPE: &str = "entry_type";
const COL_ENTRY_ID: &str = "entry_id";
const COL_METADATA: &str = "metadata";

/// `entry_type` value for table rows.
pub const TABLES_ENTRY: u8 = 0;
/// `entry_type` value for tablet rows.
pub const TABLETS_ENTRY: u8 = 1;

/// Receives each table row during [`SysCatalog::visit_tables`].
///
/// Visitors must be idempotent: a restart re-delivers every row.
pub trait TableVisitor {
    fn visit_table(&mut self, table_id: &str, metadata: &TableMetadata) -> Result<()>;
}

/// Receives each tablet row during [`SysCatalog::visit_tablets`].
pub trait TabletVisitor {
    fn visit_tablet(
        &mut self,
        table_id: &str,
        tablet_id: &str,
        metadata: &TabletMetadata,
    ) -> Result<()>;
}

/// The master's system catalog table.
pub struct SysCatalog {
    fs: Arc<FsManager>,
    options: MasterOptions,
    resolver: Arc<dyn PeerUuidResolver>,
    leader_apply_pool: Arc<ThreadPool>,
    replica_apply_pool: Arc<ThreadPool>,
    tablet_peer: RwLock<Option<Arc<LocalTabletPeer>>>,
    schema: Arc<Schema>,
    key_schema: Schema,
}

impl SysCatalog {
    pub fn new(
        fs: Arc<FsManager>,
        options: MasterOptions,
        resolver: Arc<dyn PeerUuidResolver>,
    ) -> Result<SysCatalog> {
        let leader_apply_pool = Arc::new(ThreadPoolBuilder::new("ldr-apply").build()?);
        let replica_apply_pool = Arc::new(ThreadPoolBuilder::new("repl-apply").build()?);
        let schema = Arc::new(Self::build_table_schema());
        let key_schema = schema.key_projection();
        Ok(SysCatalog {
            fs,
            options,
            resolver,
            leader_apply_pool,
            replica_apply_pool,
            tablet_peer: RwLock::new(None),
            schema,
            key_schema,
        })
    }

    pub fn table_name() -> &'static str {
        "sys.catalog"
    }

    /// The catalog schema: `(entry_type, entry_id) -> metadata`.
    ///
    /// `entry_id` is a table id or tablet id; for tablet entries the parent
    /// table id is stored inside the metadata descriptor itself.
    pub fn build_table_schema() -> Schema {
        SchemaBuilder::new()
            .add_key_column(COL_ENTRY_TYPE, DataType::UInt8)
            .add_key_column(COL_ENTRY_ID, DataType::Binary)
            .add_column(COL_METADATA, DataType::Binary)
            .build()
            .expect("catalog schema is well-formed")
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_schema(&self) -> &Schema {
        &self.key_schema
    }

    fn master_block() -> TabletMasterBlock {
        TabletMasterBlock {
            tablet_id: TabletId::new(SYS_CATALOG_TABLET_ID),
            block_a: SYS_CATALOG_BLOCK_A.to_string(),
            block_b: SYS_CATALOG_BLOCK_B.to_string(),
        }
    }

    /// First-time initialization: persists the tablet descriptor and the
    /// initial quorum, then brings the tablet online.
    pub fn create_new(&self) -> Result<()> {
        let meta = TabletMeta::create_new(
            Arc::clone(&self.fs),
            Self::master_block(),
            Self::table_name(),
            (*self.schema).clone(),
            Vec::new(),
            Vec::new(),
            BootstrapState::RemoteBootstrapDone,
        )?;

        const INITIAL_SEQNO: i64 = 0;
        let quorum = if self.options.is_distributed() {
            self.setup_distributed_quorum(INITIAL_SEQNO)
                .map_err(|e| e.prepend("failed to initialize distributed quorum"))?
        } else {
            Quorum::local_quorum(self.fs.uuid(), INITIAL_SEQNO)
        };

        ConsensusMeta::create(
            Arc::clone(&self.fs),
            TabletId::new(SYS_CATALOG_TABLET_ID),
            quorum.clone(),
            MINIMUM_TERM,
        )
        .map_err(|e| {
            e.prepend(format!(
                "unable to persist consensus metadata for tablet {}",
                SYS_CATALOG_TABLET_ID
            ))
        })?;

        self.setup_tablet(Arc::new(meta), quorum)
    }

    /// Restart path: loads the persisted descriptor and quorum. When
    /// distributed, the quorum is re-resolved from the current options under
    /// the next sequence number and re-flushed before bring-up. The stored
    /// schema is never rewritten.
    pub fn load(&self) -> Result<()> {
        let tablet_id = TabletId::new(SYS_CATALOG_TABLET_ID);
        let meta = TabletMeta::load(Arc::clone(&self.fs), &tablet_id)?;

        if meta.schema() != &*self.schema {
            return Err(TesseraError::corruption(format!(
                "unexpected schema: {}",
                meta.schema()
            )));
        }

        let mut cmeta = ConsensusMeta::load(Arc::clone(&self.fs), tablet_id.clone())?;
        if self.options.is_distributed() {
            log::info!("Configuring the quorum for distributed operation...");
            let old_seqno = cmeta.committed_quorum().seqno;
            let quorum = self.setup_distributed_quorum(old_seqno + 1)?;
            cmeta.set_committed_quorum(quorum);
            cmeta.flush().map_err(|e| {
                e.prepend(format!(
                    "unable to persist consensus metadata for tablet {}",
                    tablet_id
                ))
            })?;
        }

        let quorum = cmeta.committed_quorum().clone();
        self.setup_tablet(Arc::new(meta), quorum)
    }

    /// Builds the distributed quorum in three phases: enumerate the declared
    /// peers, resolve every missing uuid, and verify the result.
    fn setup_distributed_quorum(&self, seqno: i64) -> Result<Quorum> {
        debug_assert!(self.options.is_distributed());

        let mut quorum = Quorum {
            seqno,
            local: false,
            peers: Vec::new(),
        };

        for host_port in &self.options.follower_addresses {
            quorum
                .peers
                .push(QuorumPeer::new(PeerRole::Follower).with_addr(host_port.clone()));
        }

        let local_role = if self.options.leader {
            PeerRole::Leader
        } else {
            PeerRole::Follower
        };
        quorum.peers.push(
            QuorumPeer::new(local_role).with_addr(self.options.first_rpc_address().clone()),
        );

        // If we are not the leader, add the leader in as well.
        if !self.options.leader {
            let leader_addr = self.options.leader_address.clone().ok_or_else(|| {
                TesseraError::invalid_argument(
                    "a follower master requires a leader_address",
                )
            })?;
            quorum
                .peers
                .push(QuorumPeer::new(PeerRole::Candidate).with_addr(leader_addr));
        }

        let resolved = resolve_peer_uuids(&quorum, self.resolver.as_ref())?;
        verify_quorum(&resolved)?;
        log::debug!("Distributed quorum configuration: {}", resolved.describe());
        Ok(resolved)
    }

    fn setup_tablet(&self, meta: Arc<TabletMeta>, quorum: Quorum) -> Result<()> {
        let log_path = self.fs.data_block_path(&meta.master_block().block_a);
        let tablet = Arc::new(Tablet::new(meta));

        // Bootstrap: replay the replicated log into the fresh row store
        // before the tablet accepts new writes.
        let log = Arc::new(WriteAheadLog::open(log_path)?);
        for req in log.replay()? {
            let resp = tablet.apply_write_batch(&req);
            if let Some(error) = resp.error {
                return Err(error.prepend("unable to replay catalog log"));
            }
            // Batches that failed row validation when first submitted were
            // logged before apply; they fail identically here and change
            // nothing.
        }

        let peer = Arc::new(LocalTabletPeer::new(
            tablet,
            self.fs.uuid(),
            quorum,
            Arc::clone(&self.leader_apply_pool),
            Arc::clone(&self.replica_apply_pool),
            Some(log),
        ));

        let uuid = self.fs.uuid().to_string();
        let distributed = self.options.is_distributed();
        let configured_leader = self.options.leader;
        peer.register_quorum_change_callback(Box::new(move |quorum| {
            Self::state_changed(&uuid, distributed, configured_leader, quorum);
        }));

        peer.start()
            .map_err(|e| e.prepend("failed to start catalog tablet peer"))?;
        *self.tablet_peer.write() = Some(peer);
        Ok(())
    }

    /// Quorum-change hook. While explicit quorum assignment is the only way
    /// roles change, a master configured as leader must come up as LEADER
    /// (and a follower as FOLLOWER); anything else aborts startup.
    fn state_changed(uuid: &str, distributed: bool, configured_leader: bool, quorum: &Quorum) {
        log::info!(
            "System catalog state changed. New quorum config: {}",
            quorum.describe()
        );
        let role = quorum.role_of(uuid);
        if distributed {
            if configured_leader && role != Some(PeerRole::Leader) {
                panic!(
                    "Aborting master startup: the current peer (with uuid {}) could not be \
                     set as LEADER. Committed quorum: {}",
                    uuid,
                    quorum.describe()
                );
            }
            if !configured_leader && role != Some(PeerRole::Follower) {
                panic!(
                    "Aborting master startup: the current peer (with uuid {}) could not be \
                     set as FOLLOWER. Committed quorum: {}",
                    uuid,
                    quorum.describe()
                );
            }
        }
        let role_name = role
            .map(|r| r.to_string())
            .unwrap_or_else(|| "NON_PARTICIPANT".to_string());
        log::debug!("This master's current role is: {}", role_name);
    }

    /// Blocks until the catalog tablet's consensus is running, logging a
    /// warning every second it is not.
    pub fn wait_until_running(&self) -> Result<()> {
        let peer = self.peer()?;
        let prefix = format!(
            "T {} P {} [{}]: ",
            peer.tablet_id(),
            peer.peer_uuid(),
            Self::table_name()
        );
        let mut seconds_waited = 0;
        loop {
            match peer.wait_until_consensus_running(Duration::from_secs(1)) {
                Ok(()) => {
                    log::info!(
                        "{}configured and running, proceeding with master startup.",
                        prefix
                    );
                    return Ok(());
                }
                Err(e) if e.is_timed_out() => {
                    seconds_waited += 1;
                    log::warn!(
                        "{}not online yet (have been trying for {} seconds)",
                        prefix,
                        seconds_waited
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stops the tablet peer and then the apply pools, in reverse creation
    /// order.
    pub fn shutdown(&self) {
        if let Some(peer) = self.tablet_peer.write().take() {
            peer.shutdown();
        }
        self.leader_apply_pool.shutdown();
        self.replica_apply_pool.shutdown();
    }

    fn peer(&self) -> Result<Arc<LocalTabletPeer>> {
        self.tablet_peer.read().clone().ok_or_else(|| {
            TesseraError::illegal_state("system catalog tablet is not set up")
        })
    }

    /// Submits one write to the catalog tablet and blocks until commit.
    fn sync_write(&self, req: WriteRequest) -> Result<()> {
        let peer = self.peer()?;
        let (tx, rx) = mpsc::channel();
        peer.submit_write(
            req,
            Box::new(move |resp| {
                let _ = tx.send(resp);
            }),
        )?;
        let resp = rx.recv().map_err(|_| {
            TesseraError::aborted("catalog write was dropped before completion")
        })?;

        if let Some(error) = resp.error {
            return Err(error);
        }
        if !resp.per_row_errors.is_empty() {
            for row_error in &resp.per_row_errors {
                log::warn!("row {}: {}", row_error.row_index, row_error.error);
            }
            return Err(TesseraError::corruption("one or more rows failed to write"));
        }
        Ok(())
    }

    fn new_write_request(&self) -> WriteRequest {
        WriteRequest::new(TabletId::new(SYS_CATALOG_TABLET_ID), (*self.schema).clone())
    }

    fn catalog_row(
        &self,
        entry_type: u8,
        entry_id: &str,
        metadata: Option<Vec<u8>>,
    ) -> Result<Vec<Option<ColumnValue>>> {
        let mut row = PartialRow::new(Arc::clone(&self.schema));
        row.set_uint8(COL_ENTRY_TYPE, entry_type)?;
        row.set_binary(COL_ENTRY_ID, entry_id.as_bytes())?;
        if let Some(buf) = metadata {
            row.set_binary(COL_METADATA, buf)?;
        }
        Ok(row.into_values())
    }

    fn serialize_table_metadata(table: &TableInfo) -> Result<Vec<u8>> {
        bincode::encode_to_vec(&table.dirty_metadata(), bincode::config::standard()).map_err(
            |e| {
                TesseraError::corruption(format!(
                    "unable to serialize metadata for table {}: {}",
                    table.table_id(),
                    e
                ))
            },
        )
    }

    fn serialize_tablet_metadata(tablet: &TabletInfo) -> Result<Vec<u8>> {
        bincode::encode_to_vec(&tablet.dirty_metadata(), bincode::config::standard()).map_err(
            |e| {
                TesseraError::corruption(format!(
                    "unable to serialize metadata for tablet {}: {}",
                    tablet.tablet_id(),
                    e
                ))
            },
        )
    }

    // ==================================================================
    // Table related methods
    // ==================================================================

    pub fn add_table(&self, table: &TableInfo) -> Result<()> {
        self.write_table_entry(table, RowOperationType::Insert)
    }

    pub fn update_table(&self, table: &TableInfo) -> Result<()> {
        self.write_table_entry(table, RowOperationType::Update)
    }

    fn write_table_entry(&self, table: &TableInfo, op_type: RowOperationType) -> Result<()> {
        let metadata = Self::serialize_table_metadata(table)?;
        let mut req = self.new_write_request();
        req.add_operation(
            op_type,
            self.catalog_row(TABLES_ENTRY, table.table_id().as_str(), Some(metadata))?,
        );
        self.sync_write(req)
    }

    pub fn delete_table(&self, table: &TableInfo) -> Result<()> {
        let mut req = self.new_write_request();
        req.add_operation(
            RowOperationType::Delete,
            self.catalog_row(TABLES_ENTRY, table.table_id().as_str(), None)?,
        );
        self.sync_write(req)
    }

    // ==================================================================
    // Tablet related methods
    // ==================================================================

    fn add_tablets_to_request(
        &self,
        req: &mut WriteRequest,
        tablets: &[&TabletInfo],
        op_type: RowOperationType,
    ) -> Result<()> {
        for tablet in tablets {
            let metadata = Self::serialize_tablet_metadata(tablet)?;
            req.add_operation(
                op_type,
                self.catalog_row(TABLETS_ENTRY, tablet.tablet_id().as_str(), Some(metadata))?,
            );
        }
        Ok(())
    }

    /// Inserts and updates tablet rows in one atomic batch. Callers use this
    /// to persist a new table's tablets together with updates to existing
    /// ones.
    pub fn add_and_update_tablets(
        &self,
        tablets_to_add: &[&TabletInfo],
        tablets_to_update: &[&TabletInfo],
    ) -> Result<()> {
        let mut req = self.new_write_request();
        if !tablets_to_add.is_empty() {
            self.add_tablets_to_request(&mut req, tablets_to_add, RowOperationType::Insert)?;
        }
        if !tablets_to_update.is_empty() {
            self.add_tablets_to_request(&mut req, tablets_to_update, RowOperationType::Update)?;
        }
        self.sync_write(req)
    }

    pub fn add_tablets(&self, tablets: &[&TabletInfo]) -> Result<()> {
        self.add_and_update_tablets(tablets, &[])
    }

    pub fn update_tablets(&self, tablets: &[&TabletInfo]) -> Result<()> {
        self.add_and_update_tablets(&[], tablets)
    }

    pub fn delete_tablets(&self, tablets: &[&TabletInfo]) -> Result<()> {
        let mut req = self.new_write_request();
        for tablet in tablets {
            req.add_operation(
                RowOperationType::Delete,
                self.catalog_row(TABLETS_ENTRY, tablet.tablet_id().as_str(), None)?,
            );
        }
        self.sync_write(req)
    }

    // ==================================================================
    // Visitation
    // ==================================================================

    /// Scans all table rows in ascending key order, delivering each
    /// deserialized descriptor to `visitor`. Any visitor failure stops the
    /// scan and propagates.
    pub fn visit_tables(&self, visitor: &mut dyn TableVisitor) -> Result<()> {
        let peer = self.peer()?;
        let mut iter = peer
            .tablet()
            .new_row_iterator(self.entry_scan_spec(TABLES_ENTRY));

        let mut arena = Arena::new(32 * 1024, 256 * 1024);
        while let Some(block) = iter.next_block() {
            arena.reset();
            for row in block {
                self.visit_table_from_row(&mut arena, row, visitor)?;
            }
        }
        Ok(())
    }

    fn visit_table_from_row(
        &self,
        arena: &mut Arena,
        row: &RowData,
        visitor: &mut dyn TableVisitor,
    ) -> Result<()> {
        let id = self.stage_column(arena, row, COL_ENTRY_ID)?;
        let data = self.stage_column(arena, row, COL_METADATA)?;

        let table_id = std::str::from_utf8(arena.get(id))
            .map_err(|_| TesseraError::corruption("non-utf8 table entry id"))?;
        let (metadata, _): (TableMetadata, _) =
            bincode::decode_from_slice(arena.get(data), bincode::config::standard()).map_err(
                |e| {
                    TesseraError::corruption(format!(
                        "unable to parse metadata field for table {}: {}",
                        table_id, e
                    ))
                },
            )?;
        visitor.visit_table(table_id, &metadata)
    }

    /// Scans all tablet rows in ascending key order. The parent table id is
    /// taken from the descriptor, not the row key.
    pub fn visit_tablets(&self, visitor: &mut dyn TabletVisitor) -> Result<()> {
        let peer = self.peer()?;
        let mut iter = peer
            .tablet()
            .new_row_iterator(self.entry_scan_spec(TABLETS_ENTRY));

        let mut arena = Arena::new(32 * 1024, 256 * 1024);
        while let Some(block) = iter.next_block() {
            arena.reset();
            for row in block {
                self.visit_tablet_from_row(&mut arena, row, visitor)?;
            }
        }
        Ok(())
    }

    fn visit_tablet_from_row(
        &self,
        arena: &mut Arena,
        row: &RowData,
        visitor: &mut dyn TabletVisitor,
    ) -> Result<()> {
        let id = self.stage_column(arena, row, COL_ENTRY_ID)?;
        let data = self.stage_column(arena, row, COL_METADATA)?;

        let tablet_id = std::str::from_utf8(arena.get(id))
            .map_err(|_| TesseraError::corruption("non-utf8 tablet entry id"))?;
        let (metadata, _): (TabletMetadata, _) =
            bincode::decode_from_slice(arena.get(data), bincode::config::standard()).map_err(
                |e| {
                    TesseraError::corruption(format!(
                        "unable to parse metadata field for tablet {}: {}",
                        tablet_id, e
                    ))
                },
            )?;
        let table_id = metadata.table_id.clone();
        visitor.visit_tablet(table_id.as_str(), tablet_id, &metadata)
    }

    fn entry_scan_spec(&self, entry_type: u8) -> ScanSpec {
        let type_col = self
            .schema
            .find_column(COL_ENTRY_TYPE)
            .expect("catalog schema has entry_type");
        ScanSpec::with_predicate(ColumnRangePredicate::equality(
            type_col,
            ColumnValue::UInt8(entry_type),
        ))
    }

    fn stage_column(
        &self,
        arena: &mut Arena,
        row: &RowData,
        column: &str,
    ) -> Result<tessera_commons::util::arena::ArenaSlice> {
        let idx = self
            .schema
            .find_column(column)
            .expect("known catalog column");
        match row.get(idx).and_then(|v| v.as_ref()) {
            Some(ColumnValue::Binary(bytes)) => Ok(arena.alloc(bytes)),
            _ => Err(TesseraError::corruption(format!(
                "catalog row is missing column '{}'",
                column
            ))),
        }
    }
}
