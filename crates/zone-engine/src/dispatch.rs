//! Background executor for request callbacks
//!
//! Callbacks attached to requests (registered, connected, queried) never
//! run on the thread that drains the queue. They are handed to a small pool
//! of named worker threads over a crossbeam channel, so a slow callback
//! cannot hold up port work.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel::{self, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the callback pool
///
/// Cheap to clone. Workers exit once every handle is dropped and the
/// pending jobs have run.
#[derive(Clone)]
pub struct Dispatcher {
    jobs: Sender<Job>,
}

impl Dispatcher {
    /// Spawn `workers` threads (at least one)
    pub fn new(workers: usize) -> std::io::Result<Self> {
        let (jobs, queue) = channel::unbounded::<Job>();

        for i in 0..workers.max(1) {
            let queue = queue.clone();
            thread::Builder::new()
                .name(format!("zone-callback-{}", i))
                .spawn(move || {
                    while let Ok(job) = queue.recv() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            log::error!("Request callback panicked");
                        }
                    }
                })?;
        }

        Ok(Self { jobs })
    }

    /// Run `job` on a worker thread
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.jobs.send(Box::new(job)).is_err() {
            log::warn!("Callback pool is gone, dropping callback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_off_thread() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let (tx, rx) = channel::unbounded();
        let caller = thread::current().id();

        dispatcher.execute(move || {
            tx.send(thread::current().id()).unwrap();
        });

        let worker = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn test_panicking_job_keeps_worker() {
        let dispatcher = Dispatcher::new(1).unwrap();
        let (tx, rx) = channel::unbounded();

        dispatcher.execute(|| panic!("boom"));
        dispatcher.execute(move || tx.send(42).unwrap());

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 42);
    }
}
