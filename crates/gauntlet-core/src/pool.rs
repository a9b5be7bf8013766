//! Fixed-size worker pool draining an unbounded FIFO of jobs.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PendingCount {
    count: Mutex<usize>,
    drained: Condvar,
}

/// Cloneable enqueue handle; safe to use from any thread, including from
/// inside a running job.
#[derive(Clone)]
pub struct PoolHandle {
    tx: Sender<Job>,
    pending: Arc<PendingCount>,
}

impl PoolHandle {
    pub fn enqueue<F: FnOnce() + Send + 'static>(&self, job: F) {
        *self.pending.count.lock().unwrap() += 1;
        // Unbounded channel: send only fails after shutdown.
        if self.tx.send(Box::new(job)).is_err() {
            let mut count = self.pending.count.lock().unwrap();
            *count -= 1;
            self.pending.drained.notify_all();
        }
    }
}

/// Fixed set of worker threads pulling jobs in FIFO order. Cancellation is
/// cooperative: jobs are expected to poll the tournament stop flag
/// themselves; the pool only guarantees that queued jobs all run and that
/// `join` observes the moment the queue is empty with no job in flight.
pub struct WorkerPool {
    handle: PoolHandle,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "worker pool needs at least one thread");
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let pending = Arc::new(PendingCount {
            count: Mutex::new(0),
            drained: Condvar::new(),
        });

        let workers = (0..size)
            .map(|id| {
                let rx: Receiver<Job> = rx.clone();
                let pending = Arc::clone(&pending);
                std::thread::Builder::new()
                    .name(format!("game-worker-{id}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            job();
                            let mut count = pending.count.lock().unwrap();
                            *count -= 1;
                            pending.drained.notify_all();
                        }
                        debug!(worker = id, "worker exiting");
                    })
                    .expect("spawn game worker")
            })
            .collect();

        WorkerPool {
            handle: PoolHandle { tx, pending },
            workers,
        }
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    pub fn enqueue<F: FnOnce() + Send + 'static>(&self, job: F) {
        self.handle.enqueue(job);
    }

    /// Blocks until the queue is empty and no worker is executing a job.
    pub fn join(&self) {
        let mut count = self.handle.pending.count.lock().unwrap();
        while *count > 0 {
            count = self.handle.pending.drained.wait(count).unwrap();
        }
    }

    /// Drains remaining jobs, then stops and joins every worker.
    pub fn shutdown(&mut self) {
        self.join();
        // Closing the channel ends the worker loops.
        let (closed_tx, _) = crossbeam_channel::unbounded();
        let tx = std::mem::replace(&mut self.handle.tx, closed_tx);
        drop(tx);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_more_jobs_than_workers() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            pool.enqueue(move || {
                std::thread::sleep(Duration::from_millis(5));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn jobs_can_enqueue_followup_work() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = pool.handle();
        let inner_counter = Arc::clone(&counter);
        pool.enqueue(move || {
            inner_counter.fetch_add(1, Ordering::SeqCst);
            let chained = Arc::clone(&inner_counter);
            handle.enqueue(move || {
                chained.fetch_add(1, Ordering::SeqCst);
            });
        });
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn join_returns_immediately_when_idle() {
        let pool = WorkerPool::new(4);
        pool.join();
    }

    #[test]
    fn shutdown_joins_all_workers() {
        let mut pool = WorkerPool::new(3);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let counter = Arc::clone(&counter);
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }
}
