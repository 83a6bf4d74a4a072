//! Background work queues
//!
//! The cache hands blocking work (file reads, decompression) to a queue and
//! never waits on it. Results flow back only through shared state.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;

use crate::core::Result;

/// A unit of background work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget execution facility.
pub trait WorkQueue: Send + Sync {
    fn submit(&self, job: Job);
}

/// Worker pool backed by a dedicated rayon thread pool
pub struct ThreadPoolQueue {
    pool: rayon::ThreadPool,
}

impl ThreadPoolQueue {
    /// Create a pool with `threads` workers.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("slabstream-io-{i}"))
            .build()
            .map_err(|e| io::Error::other(e.to_string()))?;
        log::info!("Created loader pool with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }
}

impl WorkQueue for ThreadPoolQueue {
    fn submit(&self, job: Job) {
        self.pool.spawn(job);
    }
}

/// Queue that runs jobs on a tokio runtime's blocking pool
///
/// For hosts that already drive a tokio runtime.
pub struct BlockingQueue {
    handle: tokio::runtime::Handle,
}

impl BlockingQueue {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context, if there is one.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl WorkQueue for BlockingQueue {
    fn submit(&self, job: Job) {
        // Completion is observed through cache state, not the join handle.
        drop(self.handle.spawn_blocking(job));
    }
}

/// Queue whose jobs run only when the owner pumps it
///
/// Lets a single-threaded host (or a test) decide exactly when background
/// loads complete.
#[derive(Default)]
pub struct ManualQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of submitted jobs not yet run
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Run the oldest pending job. Returns false if there was none.
    pub fn run_one(&self) -> bool {
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run every pending job, including ones submitted while running.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }
}

impl WorkQueue for ManualQueue {
    fn submit(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }
}

/// Queue that runs each job inline on the submitting thread
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateQueue;

impl WorkQueue for ImmediateQueue {
    fn submit(&self, job: Job) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_manual_queue_defers_until_pumped() {
        let queue = ManualQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));

        queue.submit(counting_job(&counter));
        queue.submit(counting_job(&counter));
        assert_eq!(queue.pending(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert!(queue.run_one());
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(!queue.run_one());
    }

    #[test]
    fn test_immediate_queue_runs_inline() {
        let counter = Arc::new(AtomicUsize::new(0));
        ImmediateQueue.submit(counting_job(&counter));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thread_pool_queue_runs_jobs() {
        let queue = ThreadPoolQueue::new(2).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..4 {
            let tx = tx.clone();
            queue.submit(Box::new(move || {
                tx.send(i).unwrap();
            }));
        }

        let mut seen: Vec<i32> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_blocking_queue_runs_on_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let queue = BlockingQueue::new(runtime.handle().clone());
        let (tx, rx) = mpsc::channel();

        queue.submit(Box::new(move || {
            tx.send(7).unwrap();
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn test_blocking_queue_current_outside_runtime() {
        assert!(BlockingQueue::current().is_none());
    }
}
