//! Bounded worker pool with barrier waits.
//!
//! Jobs report success as a `bool`. A job that returns `false` or panics
//! marks the pool as failed; other jobs keep running. [`ThreadPool::wait_all`]
//! blocks until every submitted job has finished and reports whether any job
//! has failed since the pool was created.
//!
//! # Example
//!
//! ```
//! use convimg::pool::ThreadPool;
//!
//! let pool = ThreadPool::new(2);
//! pool.submit(|| true);
//! pool.submit(|| false);
//! assert!(!pool.wait_all());
//! ```

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() -> bool + Send + 'static>;

#[derive(Default)]
struct State {
    queue: VecDeque<Job>,
    in_flight: usize,
    failed: bool,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when a job is queued or the pool shuts down
    work: Condvar,
    /// Signalled when a job finishes
    done: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Jobs run outside the lock, so a poisoned lock still holds valid state
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Number of workers used when none is requested.
pub fn default_jobs() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    size: usize,
}

impl ThreadPool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            work: Condvar::new(),
            done: Condvar::new(),
        });
        let workers = (0..size)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker(&shared))
            })
            .collect();
        Self { shared, workers, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue `job`, blocking while every worker is busy.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        let mut state = self.shared.lock();
        while state.in_flight >= self.size {
            state = self.shared.done.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.in_flight += 1;
        state.queue.push_back(Box::new(job));
        drop(state);
        self.shared.work.notify_one();
    }

    /// Block until no job is in flight. Returns `false` if any job has failed.
    pub fn wait_all(&self) -> bool {
        let mut state = self.shared.lock();
        while state.in_flight > 0 {
            state = self.shared.done.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        !state.failed
    }
}

fn worker(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    break job;
                }
                if state.shutdown {
                    return;
                }
                state = shared.work.wait(state).unwrap_or_else(|e| e.into_inner());
            }
        };

        let ok = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(ok) => ok,
            Err(_) => {
                log::error!("job panicked");
                false
            }
        };

        let mut state = shared.lock();
        state.in_flight -= 1;
        if !ok {
            state.failed = true;
        }
        drop(state);
        shared.done.notify_all();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.work.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
