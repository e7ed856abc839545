//! Core downloader implementation split into focused submodules.
//!
//! The `Downloader` struct and its methods are organized by concern:
//! - [`pool`] - Bounded FIFO worker pools (interactive and prefetch)
//! - [`completion`] - Ordered delivery of results to consumer callbacks
//! - [`task`] - Per-request download algorithm and the single-winner gate
//! - [`transfer`] - Body streaming with smart cancellation and atomic commit

mod completion;
mod pool;
mod task;
mod transfer;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use completion::{Completion, DownloadCallback};
pub use pool::PoolStats;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Notify;

use crate::buffer_pool::BufferPool;
use crate::cache;
use crate::config::Config;
use crate::decode::{Decoder, MemoryPool};
use crate::error::{Error, Result};
use crate::observe::{OperationSink, TracingSink};
use crate::request::ImageRequest;
use crate::transport::Transport;
use completion::CompletionContext;
use pool::WorkerPool;

/// Who asked for a download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A consumer is waiting to show the image
    OnDemand,
    /// Speculative cache warming; runs on the prefetch pool and skips decode
    Prefetch,
}

/// Load of both worker pools
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DownloaderStats {
    /// On-demand pool
    pub interactive: PoolStats,
    /// Prefetch pool
    pub prefetch: PoolStats,
    /// Completions posted but not yet delivered
    pub pending_completions: usize,
}

/// The pools requests are scheduled on
pub(crate) struct WorkerPools {
    pub(crate) interactive: WorkerPool,
    pub(crate) prefetch: WorkerPool,
}

/// Image download engine (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Downloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Issues the HTTP requests
    pub(crate) transport: Arc<dyn Transport>,
    /// Builds in-memory images from cached files
    pub(crate) decoder: Arc<dyn Decoder>,
    /// Handed to the decoder untouched
    pub(crate) memory_pool: Arc<dyn MemoryPool>,
    /// Receives one record per attempted download
    pub(crate) sink: Arc<dyn OperationSink>,
    /// I/O scratch buffers shared by all workers
    pub(crate) buffers: Arc<BufferPool>,
    /// Interactive and prefetch pools
    pub(crate) pools: Arc<WorkerPools>,
    /// Serialized delivery of results
    pub(crate) completions: CompletionContext,
    /// Notified whenever a pool or the completion context sheds load
    pub(crate) drained: Arc<Notify>,
    /// Cleared by [`shutdown`](Self::shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl Downloader {
    /// Create a new Downloader instance
    ///
    /// This validates the configuration, creates the cache directory, removes
    /// temp files orphaned by an earlier crash and starts both worker pools and
    /// the completion context. Must be called from within a tokio runtime.
    pub async fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn Decoder>,
        memory_pool: Arc<dyn MemoryPool>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.cache_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create cache directory '{}': {}",
                        config.cache_dir.display(),
                        e
                    ),
                ))
            })?;

        let swept = cache::sweep_temp_files(&config.cache_dir).await?;
        if swept > 0 {
            tracing::info!(count = swept, "Removed orphaned temp files from cache");
        }

        let buffers = Arc::new(BufferPool::new(
            config.buffer_pool_capacity,
            config.buffer_size,
        ));

        let drained = Arc::new(Notify::new());
        let pools = Arc::new(WorkerPools {
            interactive: WorkerPool::start(
                "ImageDownloader",
                config.interactive_concurrency,
                Arc::clone(&drained),
            ),
            prefetch: WorkerPool::start(
                "ImagePrefetchDownloader",
                config.prefetch_concurrency,
                Arc::clone(&drained),
            ),
        });

        tracing::info!(
            cache_dir = %config.cache_dir.display(),
            interactive = config.interactive_concurrency,
            prefetch = config.prefetch_concurrency,
            "Image downloader initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            transport,
            decoder,
            memory_pool,
            sink: Arc::new(TracingSink),
            buffers,
            pools,
            completions: CompletionContext::start(Arc::clone(&drained)),
            drained,
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Replace the default [`TracingSink`] with another operation sink
    pub fn with_operation_sink(mut self, sink: Arc<dyn OperationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Schedule `request` and report the result to `callback`
    ///
    /// Prefetch submissions go to the prefetch pool, on-demand submissions to the
    /// interactive pool. An on-demand submission also promotes the request, so
    /// whichever worker wins the gate decodes the image. Only the winning worker
    /// posts a completion; losers do nothing.
    pub fn download_async(
        &self,
        request: Arc<ImageRequest>,
        origin: Origin,
        callback: Arc<dyn DownloadCallback>,
    ) -> Result<()> {
        if !self.accepting_new.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }

        let pool = match origin {
            Origin::OnDemand => {
                request.promote();
                &self.pools.interactive
            }
            Origin::Prefetch => &self.pools.prefetch,
        };

        let downloader = self.clone();
        pool.submit(async move {
            downloader.run_download(request, origin, callback).await;
        })
    }

    /// Current queue depth and activity of both pools
    pub fn stats(&self) -> DownloaderStats {
        DownloaderStats {
            interactive: self.pools.interactive.stats(),
            prefetch: self.pools.prefetch.stats(),
            pending_completions: self.completions.pending(),
        }
    }

    /// Wait until both pools are empty and every completion was delivered
    pub async fn wait_idle(&self) {
        loop {
            // Register before checking so a drop between the check and the await is not missed
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.stats() == DownloaderStats::default() {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting downloads and wait for scheduled ones to finish
    pub async fn shutdown(&self) {
        self.accepting_new.store(false, Ordering::Release);
        tracing::info!("Image downloader shutting down");
        self.wait_idle().await;
        tracing::info!(
            interactive = self.pools.interactive.concurrency(),
            prefetch = self.pools.prefetch.concurrency(),
            "Image downloader stopped"
        );
    }

    /// Whether new downloads are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::Acquire)
    }

    /// The configuration this downloader was built with
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The shared I/O buffer pool
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffers
    }
}
