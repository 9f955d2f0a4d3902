//! Thread pool with a variable number of threads.
//!
//! Work is submitted as opaque callable units. Threads are created on demand
//! up to `max_threads`; threads idle longer than `idle_timeout` exit down to
//! `min_threads`. `submit` returns ServiceUnavailable when the queue is full.
//! Shutdown drains running tasks, drops queued tasks, and waits for all
//! workers to exit.

use crate::error::{Result, TesseraError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Builder for [`ThreadPool`] with sane defaults.
///
/// `name` seeds worker thread names; keep it short, thread names are limited
/// to 16 characters on Linux.
pub struct ThreadPoolBuilder {
    name: String,
    min_threads: usize,
    max_threads: usize,
    max_queue_size: usize,
    idle_timeout: Duration,
}

impl ThreadPoolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let max_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        ThreadPoolBuilder {
            name: name.into(),
            min_threads: 0,
            max_threads,
            max_queue_size: usize::MAX,
            idle_timeout: Duration::from_millis(500),
        }
    }

    pub fn set_min_threads(mut self, min_threads: usize) -> Self {
        self.min_threads = min_threads;
        self
    }

    pub fn set_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn set_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    pub fn set_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Instantiate the pool and start `min_threads` permanent workers.
    pub fn build(self) -> Result<ThreadPool> {
        if self.max_threads == 0 {
            return Err(TesseraError::invalid_argument(
                "max_threads must be at least 1",
            ));
        }
        if self.min_threads > self.max_threads {
            return Err(TesseraError::invalid_argument(
                "min_threads must not exceed max_threads",
            ));
        }
        let shared = Arc::new(PoolShared {
            name: self.name,
            min_threads: self.min_threads,
            max_threads: self.max_threads,
            max_queue_size: self.max_queue_size,
            idle_timeout: self.idle_timeout,
            state: Mutex::new(PoolState {
                shut_down: false,
                queue: VecDeque::new(),
                num_threads: 0,
                active_threads: 0,
            }),
            not_empty: Condvar::new(),
            idle_cond: Condvar::new(),
            no_threads_cond: Condvar::new(),
        });
        {
            let mut state = shared.state.lock();
            for _ in 0..self.min_threads {
                spawn_worker(&shared, &mut state, true)?;
            }
        }
        Ok(ThreadPool { shared })
    }
}

struct PoolState {
    shut_down: bool,
    queue: VecDeque<Task>,
    num_threads: usize,
    active_threads: usize,
}

struct PoolShared {
    name: String,
    min_threads: usize,
    max_threads: usize,
    max_queue_size: usize,
    idle_timeout: Duration,
    state: Mutex<PoolState>,
    not_empty: Condvar,
    idle_cond: Condvar,
    no_threads_cond: Condvar,
}

/// Thread pool executing opaque `FnOnce` tasks. See the module docs for the
/// lifecycle contract.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
}

impl ThreadPool {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Submits a task for execution.
    ///
    /// Returns ServiceUnavailable if the queue is at capacity or the pool is
    /// shut down.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.shut_down {
            return Err(TesseraError::service_unavailable(format!(
                "thread pool '{}' has been shut down",
                shared.name
            )));
        }
        if state.queue.len() >= shared.max_queue_size {
            return Err(TesseraError::service_unavailable(format!(
                "thread pool '{}' queue is full",
                shared.name
            )));
        }

        // Grow if every existing thread is busy and we are under the cap.
        let idle_threads = state.num_threads - state.active_threads;
        if state.queue.len() + 1 > idle_threads && state.num_threads < shared.max_threads {
            spawn_worker(shared, &mut state, false)?;
        }

        state.queue.push_back(Box::new(task));
        shared.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until no tasks are queued or running.
    pub fn wait(&self) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        while !(state.queue.is_empty() && state.active_threads == 0) {
            shared.idle_cond.wait(&mut state);
        }
    }

    /// Like [`ThreadPool::wait`], bounded. Returns true iff the pool became
    /// idle within `timeout`.
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let shared = &self.shared;
        let mut state = shared.state.lock();
        while !(state.queue.is_empty() && state.active_threads == 0) {
            if shared
                .idle_cond
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.queue.is_empty() && state.active_threads == 0;
            }
        }
        true
    }

    /// Finishes running tasks, drops queued tasks, and joins all workers.
    /// Idempotent.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        state.shut_down = true;
        state.queue.clear();
        shared.not_empty.notify_all();
        shared.idle_cond.notify_all();
        while state.num_threads > 0 {
            shared.no_threads_cond.wait(&mut state);
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts one worker. Requires the state lock to be held.
fn spawn_worker(
    shared: &Arc<PoolShared>,
    state: &mut PoolState,
    permanent: bool,
) -> Result<()> {
    state.num_threads += 1;
    let pool = Arc::clone(shared);
    let spawned = std::thread::Builder::new()
        .name(format!("{} [worker]", shared.name))
        .spawn(move || dispatch_loop(pool, permanent));
    if let Err(e) = spawned {
        state.num_threads -= 1;
        return Err(TesseraError::io_error(format!(
            "unable to start worker for pool '{}': {}",
            shared.name, e
        )));
    }
    Ok(())
}

fn dispatch_loop(shared: Arc<PoolShared>, permanent: bool) {
    let mut state = shared.state.lock();
    loop {
        if let Some(task) = state.queue.pop_front() {
            state.active_threads += 1;
            drop(state);
            task();
            state = shared.state.lock();
            state.active_threads -= 1;
            if state.queue.is_empty() && state.active_threads == 0 {
                shared.idle_cond.notify_all();
            }
            continue;
        }
        if state.shut_down {
            break;
        }
        if permanent {
            shared.not_empty.wait(&mut state);
        } else {
            let timed_out = shared
                .not_empty
                .wait_for(&mut state, shared.idle_timeout)
                .timed_out();
            if timed_out
                && state.queue.is_empty()
                && !state.shut_down
                && state.num_threads > shared.min_threads
            {
                break;
            }
        }
    }
    state.num_threads -= 1;
    if state.num_threads == 0 {
        shared.no_threads_cond.notify_all();
    }
}
