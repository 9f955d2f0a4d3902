//! In-memory cluster fakes shared by the client integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::host_port::HostPort;
use tessera_commons::ids::{TableId, TabletId};
use tessera_commons::key_encoding::encode_row_key;
use tessera_commons::row::ColumnValue;
use tessera_commons::rpc::{PerRowError, RowOperationType, WriteRequest, WriteResponse};
use tessera_commons::schema::{DataType, Schema, SchemaBuilder};
use tessera_link::{
    MasterProxy, Messenger, TableLocations, TabletLocation, TabletServerProxy, TesseraClient,
    TesseraClientOptions, TesseraTable, WriteOp,
};

pub fn test_schema() -> Schema {
    SchemaBuilder::new()
        .add_key_column("key", DataType::String)
        .add_column("val", DataType::Binary)
        .build()
        .unwrap()
}

type RowStore = BTreeMap<Vec<u8>, Vec<Option<ColumnValue>>>;

/// Tablet server double: applies writes to in-memory row stores, with knobs
/// for latency and wrong-server responses.
pub struct FakeTabletServer {
    pub addr: HostPort,
    tablets: Mutex<HashMap<TabletId, RowStore>>,
    pub write_count: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    wrong_server: AtomicBool,
}

impl FakeTabletServer {
    pub fn new(addr: HostPort) -> Arc<FakeTabletServer> {
        Arc::new(FakeTabletServer {
            addr,
            tablets: Mutex::new(HashMap::new()),
            write_count: AtomicUsize::new(0),
            delay: Mutex::new(None),
            wrong_server: AtomicBool::new(false),
        })
    }

    pub fn host_tablet(&self, tablet_id: &TabletId) {
        self.tablets
            .lock()
            .insert(tablet_id.clone(), BTreeMap::new());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn set_wrong_server(&self, wrong: bool) {
        self.wrong_server.store(wrong, Ordering::SeqCst);
    }

    pub fn row_count(&self, tablet_id: &TabletId) -> usize {
        self.tablets
            .lock()
            .get(tablet_id)
            .map_or(0, |rows| rows.len())
    }

    pub fn row(&self, tablet_id: &TabletId, key: &[u8]) -> Option<Vec<Option<ColumnValue>>> {
        self.tablets.lock().get(tablet_id)?.get(key).cloned()
    }
}

#[async_trait]
impl TabletServerProxy for FakeTabletServer {
    async fn write(&self, req: WriteRequest) -> Result<WriteResponse> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.write_count.fetch_add(1, Ordering::SeqCst);

        if self.wrong_server.load(Ordering::SeqCst) {
            return Ok(WriteResponse::tablet_error(TesseraError::not_found(
                format!("tablet {} is not hosted by this server", req.tablet_id),
            )));
        }

        let mut tablets = self.tablets.lock();
        let rows = match tablets.get_mut(&req.tablet_id) {
            Some(rows) => rows,
            None => {
                return Ok(WriteResponse::tablet_error(TesseraError::not_found(
                    format!("tablet {} is not hosted by this server", req.tablet_id),
                )))
            }
        };

        let mut per_row_errors = Vec::new();
        for (i, op) in req.row_operations.iter().enumerate() {
            let mut fail = |error: TesseraError| {
                per_row_errors.push(PerRowError {
                    row_index: i as u32,
                    error,
                })
            };
            let key = match encode_row_key(&req.schema, &op.columns) {
                Ok(key) => key,
                Err(e) => {
                    fail(e);
                    continue;
                }
            };
            match op.op_type {
                RowOperationType::Insert => {
                    if rows.contains_key(&key) {
                        fail(TesseraError::already_present("key already present"));
                    } else {
                        rows.insert(key, op.columns.clone());
                    }
                }
                RowOperationType::Update => match rows.get_mut(&key) {
                    Some(existing) => {
                        for (idx, value) in op.columns.iter().enumerate() {
                            if value.is_some() && !req.schema.column(idx).is_key {
                                existing[idx] = value.clone();
                            }
                        }
                    }
                    None => fail(TesseraError::not_found("key not found")),
                },
                RowOperationType::Delete => {
                    if rows.remove(&key).is_none() {
                        fail(TesseraError::not_found("key not found"));
                    }
                }
            }
        }
        Ok(WriteResponse {
            error: None,
            per_row_errors,
        })
    }
}

/// Master double serving table locations out of a mutable map.
pub struct FakeMaster {
    tables: Mutex<HashMap<String, TableLocations>>,
}

impl FakeMaster {
    pub fn new() -> Arc<FakeMaster> {
        Arc::new(FakeMaster {
            tables: Mutex::new(HashMap::new()),
        })
    }

    pub fn add_table(&self, name: &str, locations: TableLocations) {
        self.tables.lock().insert(name.to_string(), locations);
    }

    pub fn set_tablet_addr(&self, name: &str, tablet_id: &TabletId, addr: HostPort) {
        let mut tables = self.tables.lock();
        let locations = tables.get_mut(name).expect("known table");
        for tablet in &mut locations.tablets {
            if &tablet.tablet_id == tablet_id {
                tablet.addr = addr.clone();
            }
        }
    }
}

#[async_trait]
impl MasterProxy for FakeMaster {
    async fn open_table(&self, table_name: &str) -> Result<TableId> {
        if self.tables.lock().contains_key(table_name) {
            Ok(TableId::new(table_name))
        } else {
            Err(TesseraError::not_found(format!(
                "the table does not exist: {}",
                table_name
            )))
        }
    }

    async fn get_table_locations(&self, table_id: &TableId) -> Result<TableLocations> {
        self.tables
            .lock()
            .get(table_id.as_str())
            .cloned()
            .ok_or_else(|| {
                TesseraError::not_found(format!("the table does not exist: {}", table_id))
            })
    }

    async fn get_tablet_location(&self, tablet_id: &TabletId) -> Result<HostPort> {
        let tables = self.tables.lock();
        for locations in tables.values() {
            for tablet in &locations.tablets {
                if &tablet.tablet_id == tablet_id {
                    return Ok(tablet.addr.clone());
                }
            }
        }
        Err(TesseraError::not_found(format!(
            "unknown tablet: {}",
            tablet_id
        )))
    }
}

/// Messenger double handing out the fakes by address.
pub struct FakeMessenger {
    master: Arc<FakeMaster>,
    tservers: Mutex<HashMap<String, Arc<FakeTabletServer>>>,
}

impl FakeMessenger {
    pub fn new(master: Arc<FakeMaster>) -> Arc<FakeMessenger> {
        Arc::new(FakeMessenger {
            master,
            tservers: Mutex::new(HashMap::new()),
        })
    }

    pub fn add_tablet_server(&self, server: Arc<FakeTabletServer>) {
        self.tservers
            .lock()
            .insert(server.addr.to_string(), server);
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn master_proxy(&self, _addr: &HostPort) -> Result<Arc<dyn MasterProxy>> {
        Ok(Arc::clone(&self.master) as Arc<dyn MasterProxy>)
    }

    async fn tablet_server_proxy(&self, addr: &HostPort) -> Result<Arc<dyn TabletServerProxy>> {
        self.tservers
            .lock()
            .get(&addr.to_string())
            .map(|s| Arc::clone(s) as Arc<dyn TabletServerProxy>)
            .ok_or_else(|| {
                TesseraError::network_error(format!("no tablet server at {}", addr))
            })
    }
}

pub struct TestCluster {
    pub messenger: Arc<FakeMessenger>,
    pub master: Arc<FakeMaster>,
    pub tserver: Arc<FakeTabletServer>,
}

/// One table `t` with a single tablet `p1` covering the whole key space,
/// hosted on one fake tablet server.
pub fn single_tablet_cluster() -> TestCluster {
    let addr = HostPort::new("127.0.0.1", 7150);
    let tserver = FakeTabletServer::new(addr.clone());
    let tablet_id = TabletId::new("p1");
    tserver.host_tablet(&tablet_id);

    let master = FakeMaster::new();
    master.add_table(
        "t",
        TableLocations {
            table_id: TableId::new("t"),
            tablets: vec![TabletLocation {
                tablet_id,
                start_key: Vec::new(),
                end_key: Vec::new(),
                addr,
            }],
        },
    );

    let messenger = FakeMessenger::new(Arc::clone(&master));
    messenger.add_tablet_server(Arc::clone(&tserver));
    TestCluster {
        messenger,
        master,
        tserver,
    }
}

pub async fn connect(cluster: &TestCluster) -> Arc<TesseraClient> {
    TesseraClient::create(
        TesseraClientOptions::new("127.0.0.1:7051"),
        Arc::clone(&cluster.messenger) as Arc<dyn Messenger>,
    )
    .await
    .unwrap()
}

pub async fn open_test_table(client: &Arc<TesseraClient>) -> Arc<TesseraTable> {
    client.open_table("t", test_schema()).await.unwrap()
}

pub fn insert_op(table: &Arc<TesseraTable>, key: &str, val: &[u8]) -> WriteOp {
    let mut op = table.new_insert();
    op.row_mut().set_string("key", key).unwrap();
    op.row_mut().set_binary("val", val).unwrap();
    op
}

pub fn update_op(table: &Arc<TesseraTable>, key: &str, val: &[u8]) -> WriteOp {
    let mut op = table.new_update();
    op.row_mut().set_string("key", key).unwrap();
    op.row_mut().set_binary("val", val).unwrap();
    op
}

pub fn encoded_key(key: &str) -> Vec<u8> {
    let schema = test_schema();
    encode_row_key(
        &schema,
        &[Some(ColumnValue::String(key.to_string())), None],
    )
    .unwrap()
}
