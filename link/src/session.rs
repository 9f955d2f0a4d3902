//! Buffered write sessions.
//!
//! A session is the vehicle for submitting writes. Operations applied to one
//! session may be batched together to amortize per-RPC costs; a batch is not
//! a transaction, and operations from different sessions never co-batch, so
//! latency-sensitive and throughput-oriented traffic can share one client
//! without interfering.
//!
//! Within one session, operations reach a given tablet in submission order.
//! Cross-tablet ordering is unspecified.
//!
//! This type is not thread-safe except for the error-retrieval methods.

use crate::client::TesseraClient;
use crate::error_collector::{ErrorCollector, PendingError, MAX_PENDING_ERRORS};
use crate::proxy::TabletLocation;
use crate::write_op::WriteOp;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tessera_commons::error::{Result, TesseraError};
use tessera_commons::host_port::HostPort;
use tessera_commons::ids::{TableId, TabletId};
use tessera_commons::rpc::{WriteRequest, WriteResponse};
use tokio::sync::Notify;

/// Default mutation buffer space per session.
pub const DEFAULT_MUTATION_BUFFER_SPACE: usize = 7 * 1024 * 1024;

/// Controls when buffered writes transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Every write is sent in-band with the `apply` call; no batching. The
    /// default. `flush` has no effect in this mode.
    AutoFlushSync,

    /// `apply` returns immediately; writes transmit in the background,
    /// batched with other writes from the same session. When the buffer is
    /// out of space, `apply` blocks until space is available. Errors land in
    /// the session's pending-error list.
    AutoFlushBackground,

    /// `apply` returns immediately; nothing transmits until `flush`. When
    /// the buffer is out of space, `apply` fails with ServiceUnavailable.
    ManualFlush,
}

/// An operation the session refused, returned with its status so the caller
/// keeps ownership.
#[derive(Debug)]
pub struct RejectedOp {
    pub op: WriteOp,
    pub error: TesseraError,
}

struct SessionState {
    flush_mode: FlushMode,
    timeout: Duration,
    // Advisory until the scheduler grows priority-aware dispatch.
    #[allow(dead_code)]
    priority: i32,
    buffer_space: usize,
    buffer: Vec<WriteOp>,
    buffer_bytes: usize,
    in_flight_ops: usize,
    closed: bool,
    flusher_running: bool,
}

struct SessionInner {
    client: Arc<TesseraClient>,
    state: Mutex<SessionState>,
    errors: ErrorCollector,
    work_available: Notify,
    space_available: Notify,
    drained: Notify,
}

/// A client-owned context for batching and flushing writes.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(client: Arc<TesseraClient>) -> Session {
        let timeout = client.options().default_timeout;
        Session {
            inner: Arc::new(SessionInner {
                client,
                state: Mutex::new(SessionState {
                    flush_mode: FlushMode::AutoFlushSync,
                    timeout,
                    priority: 0,
                    buffer_space: DEFAULT_MUTATION_BUFFER_SPACE,
                    buffer: Vec::new(),
                    buffer_bytes: 0,
                    in_flight_ops: 0,
                    closed: false,
                    flusher_running: false,
                }),
                errors: ErrorCollector::new(MAX_PENDING_ERRORS),
                work_available: Notify::new(),
                space_available: Notify::new(),
                drained: Notify::new(),
            }),
        }
    }

    /// Sets the flush mode. Requires no pending writes; flush first.
    pub fn set_flush_mode(&self, mode: FlushMode) -> Result<()> {
        let mut state = self.inner.state.lock();
        if !state.buffer.is_empty() || state.in_flight_ops > 0 {
            return Err(TesseraError::invalid_argument(
                "cannot change flush mode with pending operations",
            ));
        }
        state.flush_mode = mode;
        Ok(())
    }

    /// Sets the buffer space for outbound writes. No effect in sync mode;
    /// in background mode `apply` blocks when the space is exhausted; in
    /// manual mode it errors.
    pub fn set_mutation_buffer_space(&self, bytes: usize) {
        self.inner.state.lock().buffer_space = bytes;
    }

    /// Sets the timeout for writes made in this session.
    pub fn set_timeout_millis(&self, millis: u64) {
        self.inner.state.lock().timeout = Duration::from_millis(millis);
    }

    /// Sets the priority for calls made from this session. Advisory only.
    pub fn set_priority(&self, priority: i32) {
        self.inner.state.lock().priority = priority;
    }

    /// Applies one write according to the current flush mode.
    ///
    /// On success the session owns the operation. On failure the operation
    /// comes back inside the error and the caller's handle stays valid.
    pub async fn apply(&self, op: WriteOp) -> std::result::Result<(), RejectedOp> {
        apply_inner(&self.inner, op).await
    }

    /// Non-blocking form of [`Session::apply`]: the callback receives the
    /// final per-operation status. It may run on an I/O thread or inline on
    /// the calling task, and must not block.
    pub fn apply_async<F>(&self, op: WriteOp, cb: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = apply_inner(&inner, op).await;
            cb(result.map_err(|rejected| rejected.error));
        });
    }

    /// Drains all buffered and in-flight operations.
    ///
    /// Returns OK iff every operation succeeded; otherwise a summary status,
    /// with details available from [`Session::get_pending_errors`]. A no-op
    /// in sync mode, where every apply already flushed itself.
    pub async fn flush(&self) -> Result<()> {
        flush_inner(&self.inner).await
    }

    /// Non-blocking form of [`Session::flush`].
    pub fn flush_async<F>(&self, cb: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            cb(flush_inner(&inner).await);
        });
    }

    /// True while operations are buffered or in flight.
    pub fn has_pending_operations(&self) -> bool {
        let state = self.inner.state.lock();
        !state.buffer.is_empty() || state.in_flight_ops > 0
    }

    /// The number of errors accumulated since the last retrieval.
    pub fn count_pending_errors(&self) -> usize {
        self.inner.errors.count()
    }

    /// Moves the accumulated errors out. The boolean is true iff errors
    /// were dropped since the last retrieval.
    pub fn get_pending_errors(&self) -> (Vec<PendingError>, bool) {
        self.inner.errors.drain()
    }

    /// Closes the session. Fails with IllegalState while operations are
    /// buffered or in flight; flush first. The session stays usable after a
    /// refused close.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if !state.buffer.is_empty() || state.in_flight_ops > 0 {
                return Err(TesseraError::illegal_state(
                    "session has pending operations; flush before closing",
                ));
            }
            state.closed = true;
        }
        self.inner.work_available.notify_one();
        Ok(())
    }
}

fn validate_op(inner: &SessionInner, op: &WriteOp) -> Result<()> {
    if !Arc::ptr_eq(op.table().client(), &inner.client) {
        return Err(TesseraError::invalid_argument(
            "operation belongs to a table from a different client",
        ));
    }
    if !op.row().is_key_set() {
        return Err(TesseraError::invalid_argument("key not specified"));
    }
    Ok(())
}

async fn apply_inner(
    inner: &Arc<SessionInner>,
    op: WriteOp,
) -> std::result::Result<(), RejectedOp> {
    if let Err(error) = validate_op(inner, &op) {
        return Err(RejectedOp { op, error });
    }
    let mode = inner.state.lock().flush_mode;
    match mode {
        FlushMode::AutoFlushSync => apply_sync(inner, op).await,
        FlushMode::AutoFlushBackground => apply_background(inner, op).await,
        FlushMode::ManualFlush => apply_manual(inner, op),
    }
}

async fn apply_sync(
    inner: &Arc<SessionInner>,
    op: WriteOp,
) -> std::result::Result<(), RejectedOp> {
    let timeout = {
        let mut state = inner.state.lock();
        state.in_flight_ops += 1;
        state.timeout
    };
    let mut results = send_ops(inner, vec![op], timeout).await;

    let idle = {
        let mut state = inner.state.lock();
        state.in_flight_ops -= 1;
        state.buffer.is_empty() && state.in_flight_ops == 0
    };
    if idle {
        inner.drained.notify_waiters();
    }

    let (op, result) = results.pop().expect("one result per op");
    match result {
        Ok(()) => Ok(()),
        Err(error) => Err(RejectedOp { op, error }),
    }
}

async fn apply_background(
    inner: &Arc<SessionInner>,
    op: WriteOp,
) -> std::result::Result<(), RejectedOp> {
    loop {
        let notified = inner.space_available.notified();
        tokio::pin!(notified);
        {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(RejectedOp {
                    op,
                    error: TesseraError::illegal_state("session is closed"),
                });
            }
            let size = op.size_in_buffer();
            if size > state.buffer_space {
                return Err(RejectedOp {
                    op,
                    error: TesseraError::invalid_argument(format!(
                        "operation of {} bytes exceeds the mutation buffer space ({} bytes)",
                        size, state.buffer_space
                    )),
                });
            }
            if state.buffer_bytes + size <= state.buffer_space {
                state.buffer_bytes += size;
                state.buffer.push(op);
                ensure_flusher(inner, &mut state);
                drop(state);
                inner.work_available.notify_one();
                return Ok(());
            }
            // Out of space: register for the wakeup before releasing the
            // lock so a racing flush cannot be missed.
            notified.as_mut().enable();
        }
        notified.await;
    }
}

fn apply_manual(inner: &Arc<SessionInner>, op: WriteOp) -> std::result::Result<(), RejectedOp> {
    let mut state = inner.state.lock();
    if state.closed {
        return Err(RejectedOp {
            op,
            error: TesseraError::illegal_state("session is closed"),
        });
    }
    let size = op.size_in_buffer();
    if state.buffer_bytes + size > state.buffer_space {
        return Err(RejectedOp {
            op,
            error: TesseraError::service_unavailable(format!(
                "mutation buffer is full ({} of {} bytes)",
                state.buffer_bytes, state.buffer_space
            )),
        });
    }
    state.buffer_bytes += size;
    state.buffer.push(op);
    Ok(())
}

async fn flush_inner(inner: &Arc<SessionInner>) -> Result<()> {
    {
        let mut state = inner.state.lock();
        if state.flush_mode == FlushMode::AutoFlushSync {
            return Ok(());
        }
        if !state.buffer.is_empty() {
            ensure_flusher(inner, &mut state);
        }
    }
    inner.work_available.notify_one();

    loop {
        let notified = inner.drained.notified();
        tokio::pin!(notified);
        {
            let state = inner.state.lock();
            if state.buffer.is_empty() && state.in_flight_ops == 0 {
                break;
            }
            notified.as_mut().enable();
        }
        notified.await;
    }

    let pending = inner.errors.count();
    if pending > 0 {
        return Err(TesseraError::io_error(format!(
            "failed to flush data: {} pending errors (fetch details with get_pending_errors)",
            pending
        )));
    }
    Ok(())
}

/// Starts the background flusher task if it is not running. Requires the
/// state lock.
fn ensure_flusher(inner: &Arc<SessionInner>, state: &mut SessionState) {
    if state.flusher_running {
        return;
    }
    state.flusher_running = true;
    let inner = Arc::clone(inner);
    tokio::spawn(flusher_loop(inner));
}

async fn flusher_loop(inner: Arc<SessionInner>) {
    loop {
        let notified = inner.work_available.notified();
        tokio::pin!(notified);

        let (batch, timeout) = {
            let mut state = inner.state.lock();
            if state.buffer.is_empty() {
                if state.closed {
                    state.flusher_running = false;
                    return;
                }
                notified.as_mut().enable();
                (Vec::new(), state.timeout)
            } else {
                let batch = std::mem::take(&mut state.buffer);
                state.buffer_bytes = 0;
                state.in_flight_ops += batch.len();
                (batch, state.timeout)
            }
        };

        if batch.is_empty() {
            notified.await;
            continue;
        }

        // The taken operations are in flight now; appliers blocked on
        // buffer space can start refilling.
        inner.space_available.notify_waiters();

        let results = send_ops(&inner, batch, timeout).await;
        let batch_len = results.len();
        for (op, result) in results {
            if let Err(error) = result {
                inner.errors.record(PendingError { op, error });
            }
        }

        let idle = {
            let mut state = inner.state.lock();
            state.in_flight_ops -= batch_len;
            state.buffer.is_empty() && state.in_flight_ops == 0
        };
        if idle {
            inner.drained.notify_waiters();
        }
    }
}

/// Partitions `ops` by destination tablet and ships one write RPC per
/// tablet, preserving submission order within each. Returns each operation
/// with its final status.
async fn send_ops(
    inner: &Arc<SessionInner>,
    ops: Vec<WriteOp>,
    timeout: Duration,
) -> Vec<(WriteOp, Result<()>)> {
    let client = &inner.client;
    let mut outcomes: Vec<Option<TesseraError>> = ops.iter().map(|_| None).collect();

    let mut groups: Vec<(TabletLocation, Vec<usize>)> = Vec::new();
    let mut group_by_tablet: HashMap<TabletId, usize> = HashMap::new();
    for (i, op) in ops.iter().enumerate() {
        let partition_key = match op.row().encoded_key() {
            Ok(key) => key,
            Err(e) => {
                outcomes[i] = Some(e);
                continue;
            }
        };
        match client
            .meta_cache()
            .lookup_tablet(op.table().table_id(), &partition_key)
            .await
        {
            Ok(location) => {
                let group = *group_by_tablet
                    .entry(location.tablet_id.clone())
                    .or_insert_with(|| {
                        groups.push((location, Vec::new()));
                        groups.len() - 1
                    });
                groups[group].1.push(i);
            }
            Err(e) => outcomes[i] = Some(e),
        }
    }

    for (location, indexes) in groups {
        let table = ops[indexes[0]].table();
        let mut req = WriteRequest::new(location.tablet_id.clone(), table.schema().clone());
        for &i in &indexes {
            req.row_operations.push(ops[i].to_row_operation());
        }

        let first_key = ops[indexes[0]]
            .row()
            .encoded_key()
            .expect("grouped op has a key");
        let table_id = table.table_id().clone();
        match write_with_retry(inner, &table_id, &location, req, timeout, &first_key).await {
            Ok(resp) => {
                if let Some(error) = resp.error {
                    for &i in &indexes {
                        outcomes[i] = Some(error.clone());
                    }
                } else {
                    for row_error in resp.per_row_errors {
                        let i = indexes[row_error.row_index as usize];
                        outcomes[i] = Some(row_error.error);
                    }
                }
            }
            Err(error) => {
                for &i in &indexes {
                    outcomes[i] = Some(error.clone());
                }
            }
        }
    }

    ops.into_iter()
        .zip(outcomes)
        .map(|(op, outcome)| (op, outcome.map_or(Ok(()), Err)))
        .collect()
}

/// Sends one batch, refreshing a stale location and retrying once if the
/// server does not host the tablet anymore.
async fn write_with_retry(
    inner: &Arc<SessionInner>,
    table_id: &TableId,
    location: &TabletLocation,
    req: WriteRequest,
    timeout: Duration,
    partition_key: &[u8],
) -> Result<WriteResponse> {
    let first = write_once(inner, &location.addr, req.clone(), timeout).await;
    let stale = match &first {
        Ok(resp) => resp
            .error
            .as_ref()
            .map_or(false, |e| e.is_not_found() || e.is_illegal_state()),
        Err(e) => e.is_not_found(),
    };
    if !stale {
        return first;
    }

    log::debug!(
        "Location of tablet {} at {} is stale; refreshing and retrying once",
        location.tablet_id,
        location.addr
    );
    inner
        .client
        .meta_cache()
        .invalidate_tablet(table_id, &location.tablet_id);
    let fresh = inner
        .client
        .meta_cache()
        .lookup_tablet(table_id, partition_key)
        .await?;
    let mut retry_req = req;
    retry_req.tablet_id = fresh.tablet_id.clone();
    write_once(inner, &fresh.addr, retry_req, timeout).await
}

async fn write_once(
    inner: &Arc<SessionInner>,
    addr: &HostPort,
    req: WriteRequest,
    timeout: Duration,
) -> Result<WriteResponse> {
    let proxy = inner.client.messenger().tablet_server_proxy(addr).await?;
    let tablet_id = req.tablet_id.clone();
    match tokio::time::timeout(timeout, proxy.write(req)).await {
        Ok(result) => result,
        Err(_) => Err(TesseraError::timed_out(format!(
            "write to tablet {} timed out after {:?}",
            tablet_id, timeout
        ))),
    }
}
