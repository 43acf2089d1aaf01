use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Submission was rejected because the backlog queue is full (or the
/// pool is shutting down). Deliberate backpressure, not a failure.
#[derive(Debug, thiserror::Error)]
#[error("worker pool backlog is full")]
pub struct PoolSaturated;

/// Fixed set of OS worker threads consuming jobs from a bounded queue.
///
/// `try_execute` never blocks: when the queue is full the job is
/// returned to the caller, which drops it — for a connection job that
/// closes the socket immediately. No unbounded buffering anywhere.
pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(workers: usize, backlog: usize) -> Self {
        assert!(workers > 0, "worker pool needs at least one worker");
        let (tx, rx) = bounded::<Job>(backlog);

        let workers = (0..workers)
            .map(|i| {
                let rx: Receiver<Job> = rx.clone();
                thread::Builder::new()
                    .name(format!("gatehouse-worker-{i}"))
                    .spawn(move || {
                        for job in rx.iter() {
                            // A panicking job must not take the worker with it
                            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                                tracing::error!("worker job panicked");
                            }
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Submit a job without blocking. `Err(PoolSaturated)` when the
    /// backlog is full; the job is dropped.
    pub fn try_execute(&self, job: impl FnOnce() + Send + 'static) -> Result<(), PoolSaturated> {
        let tx = self.tx.as_ref().ok_or(PoolSaturated)?;
        match tx.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => Err(PoolSaturated),
        }
    }

    /// Stop accepting work and wait up to `grace` for in-flight jobs.
    ///
    /// Workers still running at the deadline are detached rather than
    /// joined; their sockets carry read timeouts, so they terminate on
    /// their own shortly after.
    pub fn shutdown(&mut self, grace: Duration) {
        // Closing the channel lets workers drain the queue and exit
        self.tx.take();

        let deadline = Instant::now() + grace;
        let mut abandoned = 0usize;
        for handle in self.workers.drain(..) {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                abandoned += 1;
            }
        }
        if abandoned > 0 {
            tracing::warn!(abandoned, "grace period expired with workers still busy");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.tx.is_some() || !self.workers.is_empty() {
            self.shutdown(Duration::from_secs(0));
        }
    }
}
