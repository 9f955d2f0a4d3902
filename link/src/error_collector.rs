//! Per-session accumulation of background write failures.
//!
//! Errors own their operation and status as values; the list is a bounded
//! ring that drops the oldest entry on overflow and remembers that it did so
//! until the next retrieval.

use crate::write_op::WriteOp;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tessera_commons::error::TesseraError;

/// Default capacity of a session's pending-error list.
pub const MAX_PENDING_ERRORS: usize = 1000;

/// A failed operation retained for later retrieval. The caller gets the
/// operation back along with the status the server (or transport) produced.
#[derive(Debug)]
pub struct PendingError {
    pub op: WriteOp,
    pub error: TesseraError,
}

struct CollectorState {
    errors: VecDeque<PendingError>,
    overflowed: bool,
    capacity: usize,
}

/// Thread-safe bounded FIFO of pending errors.
pub struct ErrorCollector {
    state: Mutex<CollectorState>,
}

impl ErrorCollector {
    pub fn new(capacity: usize) -> ErrorCollector {
        ErrorCollector {
            state: Mutex::new(CollectorState {
                errors: VecDeque::new(),
                overflowed: false,
                capacity,
            }),
        }
    }

    /// Appends an error, dropping the oldest entry if the list is full.
    pub fn record(&self, error: PendingError) {
        let mut state = self.state.lock();
        if state.errors.len() >= state.capacity {
            state.errors.pop_front();
            state.overflowed = true;
        }
        state.errors.push_back(error);
    }

    pub fn count(&self) -> usize {
        self.state.lock().errors.len()
    }

    /// Moves the accumulated errors out. The boolean is true iff any errors
    /// were dropped since the last retrieval; retrieval clears it.
    pub fn drain(&self) -> (Vec<PendingError>, bool) {
        let mut state = self.state.lock();
        let overflowed = state.overflowed;
        state.overflowed = false;
        (state.errors.drain(..).collect(), overflowed)
    }
}
