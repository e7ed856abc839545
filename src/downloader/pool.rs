//! Bounded worker pools.
//!
//! Each pool owns a FIFO job channel and a dispatcher task. The dispatcher takes
//! jobs in submission order, waits for one of the pool's permits and spawns the
//! job holding that permit, so at most `concurrency` jobs of a pool run at once.
//! Nothing is held while a pool is idle except the parked dispatcher.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{Notify, Semaphore, mpsc};

use crate::error::{Error, Result};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Snapshot of a pool's load
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Jobs submitted but not yet started
    pub queued: usize,
    /// Jobs currently running
    pub active: usize,
}

struct Counters {
    queued: AtomicUsize,
    active: AtomicUsize,
    /// Woken whenever a count drops
    drained: Arc<Notify>,
}

/// Decrements the active count when a job finishes, even by panic
struct ActiveGuard(Arc<Counters>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
        self.0.drained.notify_waiters();
    }
}

pub(crate) struct WorkerPool {
    name: &'static str,
    concurrency: usize,
    tx: mpsc::UnboundedSender<Job>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Start a pool; must be called from within a tokio runtime
    ///
    /// `drained` is notified every time the pool's load decreases.
    pub(crate) fn start(name: &'static str, concurrency: usize, drained: Arc<Notify>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let counters = Arc::new(Counters {
            queued: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            drained,
        });
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let dispatch_counters = Arc::clone(&counters);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                // Count as active before leaving the queue so the pool never looks idle mid-handoff
                dispatch_counters.active.fetch_add(1, Ordering::AcqRel);
                dispatch_counters.queued.fetch_sub(1, Ordering::AcqRel);
                let guard = ActiveGuard(Arc::clone(&dispatch_counters));
                tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    job.await;
                });
            }
            tracing::debug!(pool = name, "Worker pool stopped");
        });

        Self {
            name,
            concurrency,
            tx,
            counters,
        }
    }

    /// Queue a job behind everything already submitted to this pool
    pub(crate) fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.counters.queued.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(Box::pin(job)).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::AcqRel);
            self.counters.drained.notify_waiters();
            tracing::error!(pool = self.name, "Worker pool dispatcher is gone");
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            queued: self.counters.queued.load(Ordering::Acquire),
            active: self.counters.active.load(Ordering::Acquire),
        }
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.concurrency
    }
}
