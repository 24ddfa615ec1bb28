//! Background persistence worker
//!
//! Transactions hand their deltas to a dedicated thread and return without
//! waiting. Jobs run in submission order; failures are logged, counted and
//! dropped.

use crate::metrics::SpaceMetrics;
use crate::storage::{Storage, StoreDelta};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

pub(crate) enum Job {
    Store(StoreDelta),
    Clear,
}

/// Count of submitted jobs not yet finished
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

pub(crate) struct WriteBehind {
    sender: Mutex<Option<UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<Pending>,
}

impl WriteBehind {
    pub(crate) fn start(storage: Arc<dyn Storage>, metrics: Arc<SpaceMetrics>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Pending::default());
        let worker_pending = Arc::clone(&pending);
        let worker = thread::Builder::new()
            .name("thingspace-writer".to_string())
            .spawn(move || run_write_loop(storage, metrics, worker_pending, rx))?;
        Ok(Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            pending,
        })
    }

    /// Queue a job; dropped with a warning once the worker is shut down
    pub(crate) fn submit(&self, job: Job) {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            warn!("Write-behind worker is shut down, dropping job");
            return;
        };
        self.pending.add();
        if sender.send(job).is_err() {
            warn!("Write-behind worker is gone, dropping job");
            self.pending.done();
        }
    }

    /// Block until every submitted job finished or `timeout` passed
    ///
    /// Returns true when the queue drained in time.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.count.lock();
        while *count > 0 {
            if self.pending.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    /// Close the queue and join the worker once it drained
    pub(crate) fn shutdown(&self) {
        drop(self.sender.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("Write-behind worker panicked");
            }
        }
    }
}

impl Drop for WriteBehind {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_write_loop(
    storage: Arc<dyn Storage>,
    metrics: Arc<SpaceMetrics>,
    pending: Arc<Pending>,
    mut rx: UnboundedReceiver<Job>,
) {
    while let Some(job) = rx.blocking_recv() {
        let (what, result) = match &job {
            Job::Store(delta) => ("store", storage.store(delta)),
            Job::Clear => ("clear", storage.clear()),
        };
        match result {
            Ok(()) => {
                debug!(job = what, "Persisted");
                metrics.record_write(true);
            }
            Err(err) => {
                warn!(job = what, error = %err, "Persistence failed, in-memory state is kept");
                metrics.record_write(false);
            }
        }
        pending.done();
    }
    debug!("Write-behind worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::thing::{Thing, ThingType};

    fn delta() -> StoreDelta {
        let kind = Arc::new(ThingType::entity("Item", &["id"]));
        let thing = Thing::builder(&kind).set("id", "x").build();
        let mut delta = StoreDelta::new();
        delta.add_thing(thing.key(), thing);
        delta
    }

    #[test]
    fn test_jobs_run_in_order() {
        let storage = Arc::new(MemoryStorage::new());
        let metrics = Arc::new(SpaceMetrics::new());
        let writer = WriteBehind::start(storage.clone(), metrics.clone()).unwrap();

        writer.submit(Job::Store(delta()));
        writer.submit(Job::Clear);
        writer.submit(Job::Store(delta()));

        assert!(writer.wait_idle(Duration::from_secs(5)));
        assert_eq!(storage.snapshot().things.len(), 1);
        assert_eq!(metrics.snapshot().writes_succeeded, 3);
    }

    #[test]
    fn test_failures_are_counted() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_failing(true);
        let metrics = Arc::new(SpaceMetrics::new());
        let writer = WriteBehind::start(storage, metrics.clone()).unwrap();

        writer.submit(Job::Store(delta()));

        assert!(writer.wait_idle(Duration::from_secs(5)));
        assert_eq!(metrics.snapshot().writes_failed, 1);
    }

    #[test]
    fn test_submit_after_shutdown_is_dropped() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = WriteBehind::start(storage.clone(), Arc::new(SpaceMetrics::new())).unwrap();

        writer.shutdown();
        writer.submit(Job::Store(delta()));

        assert!(writer.wait_idle(Duration::from_millis(10)));
        assert!(storage.snapshot().is_empty());
    }
}
