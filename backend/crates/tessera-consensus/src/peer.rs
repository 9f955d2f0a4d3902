//! The tablet peer: the consensus-replicated write executor for one tablet.
//!
//! A peer accepts batched writes, replicates them through its quorum, waits
//! for durable commit, and invokes the caller's completion. This crate ships
//! [`LocalTabletPeer`], which hosts a tablet whose quorum commits locally
//! (single-node quorums and the bootstrap-time leader path). Remote
//! replication lives with the consensus transport, an external collaborator
//! implementing the same trait.

use crate::quorum::{PeerRole, Quorum};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::ids::TabletId;
use tessera_commons::rpc::{WriteRequest, WriteResponse};
use tessera_commons::util::threadpool::ThreadPool;
use tessera_store::tablet::Tablet;
use tessera_store::wal::WriteAheadLog;

/// Invoked with the response once a submitted write has committed.
pub type WriteCompletionCallback = Box<dyn FnOnce(WriteResponse) + Send + 'static>;

/// Invoked synchronously whenever the peer's quorum configuration changes.
pub type QuorumChangeCallback = Box<dyn Fn(&Quorum) + Send + Sync + 'static>;

/// Contract of a consensus-replicated write executor.
pub trait TabletPeer: Send + Sync {
    fn tablet_id(&self) -> &TabletId;

    /// This peer's stable identifier within the quorum.
    fn peer_uuid(&self) -> &str;

    /// This peer's current role, per the committed quorum.
    fn role(&self) -> PeerRole;

    fn quorum(&self) -> Quorum;

    /// Submits a write for replication. `completion` runs once the write has
    /// durably committed (or failed); it may run on an apply-pool thread.
    fn submit_write(&self, req: WriteRequest, completion: WriteCompletionCallback) -> Result<()>;

    /// Blocks until the underlying consensus is accepting writes, up to
    /// `timeout`. TimedOut if it is not running by then; Aborted if the peer
    /// shut down while waiting.
    fn wait_until_consensus_running(&self, timeout: Duration) -> Result<()>;

    fn shutdown(&self);
}

struct PeerState {
    quorum: Quorum,
    running: bool,
    shut_down: bool,
}

/// Tablet peer whose replicated log commits locally.
pub struct LocalTabletPeer {
    tablet: Arc<Tablet>,
    tablet_id: TabletId,
    peer_uuid: String,
    leader_apply_pool: Arc<ThreadPool>,
    // Held for the replica-side apply contract; the local commit path never
    // routes through it.
    #[allow(dead_code)]
    replica_apply_pool: Arc<ThreadPool>,
    log: Option<Arc<WriteAheadLog>>,
    state: Mutex<PeerState>,
    running_changed: Condvar,
    quorum_change_callbacks: Mutex<Vec<QuorumChangeCallback>>,
}

impl LocalTabletPeer {
    pub fn new(
        tablet: Arc<Tablet>,
        peer_uuid: impl Into<String>,
        quorum: Quorum,
        leader_apply_pool: Arc<ThreadPool>,
        replica_apply_pool: Arc<ThreadPool>,
        log: Option<Arc<WriteAheadLog>>,
    ) -> LocalTabletPeer {
        let tablet_id = tablet.meta().tablet_id().clone();
        LocalTabletPeer {
            tablet,
            tablet_id,
            peer_uuid: peer_uuid.into(),
            leader_apply_pool,
            replica_apply_pool,
            log,
            state: Mutex::new(PeerState {
                quorum,
                running: false,
                shut_down: false,
            }),
            running_changed: Condvar::new(),
            quorum_change_callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn tablet(&self) -> &Arc<Tablet> {
        &self.tablet
    }

    /// Registers a callback fired on every quorum-configuration change,
    /// including the initial configuration at [`LocalTabletPeer::start`].
    pub fn register_quorum_change_callback(&self, cb: QuorumChangeCallback) {
        self.quorum_change_callbacks.lock().push(cb);
    }

    /// Brings the peer online and fires the quorum-change callbacks with the
    /// committed configuration.
    pub fn start(&self) -> Result<()> {
        let quorum = {
            let mut state = self.state.lock();
            if state.shut_down {
                return Err(TesseraError::illegal_state(format!(
                    "tablet peer {} is shut down",
                    self.tablet_id
                )));
            }
            state.running = true;
            self.running_changed.notify_all();
            state.quorum.clone()
        };
        self.notify_quorum_change(&quorum);
        Ok(())
    }

    /// Replaces the committed quorum and fires the change callbacks.
    pub fn set_quorum(&self, quorum: Quorum) {
        {
            let mut state = self.state.lock();
            state.quorum = quorum.clone();
        }
        self.notify_quorum_change(&quorum);
    }

    fn notify_quorum_change(&self, quorum: &Quorum) {
        for cb in self.quorum_change_callbacks.lock().iter() {
            cb(quorum);
        }
    }
}

impl TabletPeer for LocalTabletPeer {
    fn tablet_id(&self) -> &TabletId {
        &self.tablet_id
    }

    fn peer_uuid(&self) -> &str {
        &self.peer_uuid
    }

    fn role(&self) -> PeerRole {
        self.state
            .lock()
            .quorum
            .role_of(&self.peer_uuid)
            .unwrap_or(PeerRole::Follower)
    }

    fn quorum(&self) -> Quorum {
        self.state.lock().quorum.clone()
    }

    fn submit_write(&self, req: WriteRequest, completion: WriteCompletionCallback) -> Result<()> {
        {
            let state = self.state.lock();
            if !state.running || state.shut_down {
                return Err(TesseraError::illegal_state(format!(
                    "tablet peer {} is not running",
                    self.tablet_id
                )));
            }
        }
        let tablet = Arc::clone(&self.tablet);
        let log = self.log.clone();
        self.leader_apply_pool.submit(move || {
            // The batch replicates (appends durably) before it applies; the
            // completion sees a commit only once both have happened.
            if let Some(log) = &log {
                if let Err(e) = log.append(&req) {
                    completion(WriteResponse::tablet_error(
                        e.prepend("unable to replicate write batch"),
                    ));
                    return;
                }
            }
            let resp = tablet.apply_write_batch(&req);
            completion(resp);
        })
    }

    fn wait_until_consensus_running(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.shut_down {
                return Err(TesseraError::aborted(format!(
                    "tablet peer {} shut down while waiting for consensus",
                    self.tablet_id
                )));
            }
            if state.running {
                return Ok(());
            }
            if self
                .running_changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Err(TesseraError::timed_out(format!(
                    "consensus for tablet {} is not running",
                    self.tablet_id
                )));
            }
        }
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.shut_down = true;
        self.running_changed.notify_all();
    }
}
