//! Bounded worker pool
//!
//! A fixed number of workers pull boxed jobs from a bounded queue. Submitting
//! never blocks: a full queue is reported straight back to the caller. All
//! workers share one cancellation token, handed to every job.

use crate::utils::error::PoolError;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

// ============================================================================
// Configuration
// ============================================================================

/// Pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of concurrently executing jobs
    pub workers: usize,

    /// Pending jobs accepted before `submit` reports `QueueFull`
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 100,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
struct PoolStats {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl PoolStats {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Worker Pool
// ============================================================================

/// Fixed-size pool of async workers over a bounded queue
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    capacity: usize,
    token: CancellationToken,
    stats: Arc<PoolStats>,
    /// Jobs submitted but not yet finished (queued + running)
    outstanding: Arc<watch::Sender<usize>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start the workers. Must be called from within a tokio runtime.
    pub fn new(config: PoolConfig, token: CancellationToken) -> Self {
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Job>(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let stats = Arc::new(PoolStats::default());
        let (outstanding, _) = watch::channel(0usize);
        let outstanding = Arc::new(outstanding);

        let handles = (0..workers)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let token = token.clone();
                let stats = Arc::clone(&stats);
                let outstanding = Arc::clone(&outstanding);
                tokio::spawn(async move {
                    Self::worker_loop(worker_id, rx, token, stats, outstanding).await;
                })
            })
            .collect();

        debug!(workers, capacity, "worker pool started");

        Self {
            sender: Mutex::new(Some(tx)),
            capacity,
            token,
            stats,
            outstanding,
            handles: Mutex::new(handles),
        }
    }

    async fn worker_loop(
        worker_id: usize,
        rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
        token: CancellationToken,
        stats: Arc<PoolStats>,
        outstanding: Arc<watch::Sender<usize>>,
    ) {
        loop {
            let job = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    job = rx.recv() => job,
                }
            };

            let Some(job) = job else {
                debug!(worker_id, "worker exiting");
                break;
            };

            stats.enter();
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = job(token.clone()) => {}
            }
            stats.leave();
            outstanding.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    /// Enqueue a job without blocking.
    ///
    /// # Errors
    ///
    /// `PoolError::QueueFull` when the queue is at capacity and
    /// `PoolError::Closed` after [`close`](Self::close) or cancellation.
    pub fn submit<F, Fut>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.token.is_cancelled() {
            return Err(PoolError::Closed);
        }

        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(PoolError::Closed)?;

        let job: Job = Box::new(move |token| Box::pin(task(token)));
        self.outstanding.send_modify(|n| *n += 1);
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
                warn!(capacity = self.capacity, "worker queue full, rejecting job");
                Err(PoolError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
                Err(PoolError::Closed)
            }
        }
    }

    /// Wait until every submitted job has finished, or the pool is cancelled
    pub async fn wait(&self) {
        let mut rx = self.outstanding.subscribe();
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {}
            _ = rx.wait_for(|n| *n == 0) => {}
        }
    }

    /// Stop accepting jobs. Workers exit once the queue drains.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Cancel every job and release the workers
    pub fn cancel(&self) {
        self.token.cancel();
        self.close();
    }

    /// Close the pool and wait for every worker task to exit
    pub async fn shutdown(&self) {
        self.close();
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
    }

    /// Jobs executing right now
    pub fn active_workers(&self) -> usize {
        self.stats.active.load(Ordering::SeqCst)
    }

    /// Highest number of jobs that ever executed at once
    pub fn peak_active(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }

    /// Jobs queued but not yet picked up by a worker
    pub fn queue_depth(&self) -> usize {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.max_capacity() - s.capacity())
            .unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Deduplication
// ============================================================================

/// Natural keys already merged during one batch.
///
/// The batch caller creates it, passes it to whoever merges results and
/// clears it when it wants to; nothing resets it behind the caller's back.
#[derive(Debug, Default)]
pub struct SeenKeys {
    keys: Mutex<HashSet<String>>,
}

impl SeenKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`; returns `true` if it had not been seen before
    pub fn check_and_mark(&self, key: &str) -> bool {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if keys.contains(key) {
            false
        } else {
            keys.insert(key.to_string());
            true
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
