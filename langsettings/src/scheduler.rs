// SPDX-License-Identifier: GPL-3.0-or-later

//! Runs provider jobs on a small worker pool.
//!
//! Jobs carry a key (the provider id) and a family (the run group).
//! A key has at most one job waiting in the queue: scheduling it again
//! while one waits is a no-op. Callers wait for a whole family with
//! [`Scheduler::join`].

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

/// A shared flag that long running work polls to stop early.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancels the token when the process receives a termination signal.
    pub fn cancel_on_signals(&self) -> std::io::Result<()> {
        for signal in signal_hook::consts::TERM_SIGNALS {
            signal_hook::flag::register(*signal, Arc::clone(&self.0))?;
        }
        Ok(())
    }
}

/// Work executed by the scheduler.
pub type Job = Box<dyn FnOnce(&CancellationToken) + Send + 'static>;

struct Task {
    key: String,
    family: String,
    job: Job,
}

#[derive(Default)]
struct Bookkeeping {
    queued: HashSet<String>,
    pending: HashMap<String, usize>,
}

#[derive(Default)]
struct Shared {
    bookkeeping: Mutex<Bookkeeping>,
    finished: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Bookkeeping> {
        self.bookkeeping.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Scheduler {
    sender: Option<Sender<Task>>,
    workers: Vec<thread::JoinHandle<()>>,
    shared: Arc<Shared>,
    cancellation: CancellationToken,
}

impl Scheduler {
    pub fn new(workers: usize, cancellation: CancellationToken) -> Self {
        let (sender, receiver) = unbounded::<Task>();
        let shared = Arc::new(Shared::default());

        let workers = (0..workers.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                let shared = Arc::clone(&shared);
                let cancellation = cancellation.clone();
                thread::Builder::new()
                    .name(format!("langsettings-worker-{index}"))
                    .spawn(move || work(receiver, shared, cancellation))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(error) => {
                    log::error!("Failed to start worker thread: {error}");
                    None
                }
            })
            .collect();

        Self { sender: Some(sender), workers, shared, cancellation }
    }

    /// Queues a job unless one with the same key is already waiting.
    ///
    /// Returns false when the request was coalesced into the waiting job.
    pub fn schedule(&self, key: &str, family: &str, job: Job) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        {
            let mut bookkeeping = self.shared.lock();
            if !bookkeeping.queued.insert(key.to_string()) {
                log::debug!("Job '{key}' is already queued");
                return false;
            }
            *bookkeeping.pending.entry(family.to_string()).or_default() += 1;
        }

        let task = Task { key: key.to_string(), family: family.to_string(), job };
        if let Err(error) = sender.send(task) {
            log::error!("Failed to queue job '{key}': scheduler stopped");
            let task = error.into_inner();
            finish(&self.shared, &task.key, &task.family);
            self.shared.lock().queued.remove(&task.key);
            return false;
        }
        true
    }

    /// Blocks until no job of the family is queued or running.
    pub fn join(&self, family: &str) {
        let mut bookkeeping = self.shared.lock();
        while bookkeeping.pending.get(family).copied().unwrap_or(0) > 0 {
            bookkeeping = self.shared.finished.wait(bookkeeping).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
    }
}

fn work(receiver: Receiver<Task>, shared: Arc<Shared>, cancellation: CancellationToken) {
    for task in receiver.iter() {
        // From here on a new request for the key may queue behind this run.
        shared.lock().queued.remove(&task.key);

        log::debug!("Running job '{}' of '{}'", task.key, task.family);
        let job = task.job;
        if catch_unwind(AssertUnwindSafe(|| job(&cancellation))).is_err() {
            log::error!("Job '{}' panicked", task.key);
        }
        finish(&shared, &task.key, &task.family);
    }
}

fn finish(shared: &Shared, key: &str, family: &str) {
    let mut bookkeeping = shared.lock();
    if let Some(count) = bookkeeping.pending.get_mut(family) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            bookkeeping.pending.remove(family);
        }
    }
    log::debug!("Job '{key}' of '{family}' finished");
    shared.finished.notify_all();
}
