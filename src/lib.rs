//! # image-dl
//!
//! Asynchronous image download engine with a content-addressed disk cache.
//!
//! ## Design Philosophy
//!
//! image-dl is designed to be:
//! - **Cache-first** - Every image lands on disk under a deterministic name before it is decoded
//! - **Wasteless** - A request is fetched at most once, however many callers ask for it
//! - **Cancellation-aware** - Abandoned requests stop early, nearly finished ones complete
//! - **Library-first** - Transport, decoder and metrics sink are pluggable traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use image_dl::{
//!     Completion, Config, DisplayMetrics, Downloader, HttpTransport, ImageLoadSpec,
//!     ImageRequest, ImgixEnhancer, NoOpMemoryPool, Origin,
//! };
//! # use image_dl::{Decoder, MemoryPool};
//! # struct MyDecoder;
//! # #[async_trait::async_trait]
//! # impl Decoder for MyDecoder {
//! #     async fn decode(&self, _: &dyn MemoryPool, _: &ImageRequest, _: &std::path::Path,
//! #         _: &ImageLoadSpec) -> image_dl::Result<()> { Ok(()) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let transport = Arc::new(HttpTransport::new(&config)?);
//!     let downloader = Downloader::new(
//!         config.clone(),
//!         transport,
//!         Arc::new(MyDecoder),
//!         Arc::new(NoOpMemoryPool),
//!     )
//!     .await?;
//!
//!     let spec = ImageLoadSpec::builder(DisplayMetrics::default())
//!         .square(128)
//!         .build()?;
//!     let request = Arc::new(ImageRequest::new(
//!         "https://images.example.com/cat.jpg",
//!         spec,
//!         &ImgixEnhancer,
//!         &config.cache_dir,
//!         false,
//!     )?);
//!
//!     downloader.download_async(
//!         request,
//!         Origin::OnDemand,
//!         Arc::new(|c: &Completion| println!("{} downloaded={}", c.request, c.downloaded)),
//!     )?;
//!
//!     downloader.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Reusable I/O buffers
pub mod buffer_pool;
/// Cache file naming and temp-file housekeeping
pub mod cache;
/// Configuration types
pub mod config;
/// Decoder and memory pool seams
pub mod decode;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// URL rewriting for image CDNs
pub mod enhancer;
/// Error types
pub mod error;
/// Per-download operation records
pub mod observe;
/// Image requests and their lifecycle
pub mod request;
/// Image load specifications
pub mod spec;
/// HTTP transport
pub mod transport;

// Re-export commonly used types
pub use buffer_pool::{BufferPool, PooledBuffer};
pub use config::Config;
pub use decode::{Decoder, MemoryPool, NoOpMemoryPool};
pub use downloader::{
    Completion, DownloadCallback, Downloader, DownloaderStats, Origin, PoolStats,
};
pub use enhancer::{IdentityEnhancer, ImgixEnhancer, UriEnhancer};
pub use error::{DownloadError, Error, Result};
pub use observe::{MemorySink, OperationRecord, OperationSink, TracingSink};
pub use request::{ImageRequest, RequestState};
pub use spec::{
    DimensionResources, DisplayMetrics, Format, ImageLoadSpec, ImageLoadSpecBuilder, PixelConfig,
};
pub use transport::{BodyStream, HttpResponse, HttpTransport, Transport};

/// Run until a termination signal arrives, then shut the downloader down.
///
/// Listens for Ctrl+C everywhere and additionally for SIGTERM on Unix.
///
/// # Example
///
/// ```no_run
/// use image_dl::{Downloader, run_with_shutdown};
///
/// async fn serve(downloader: Downloader) {
///     // Schedule downloads from other tasks, then block here until asked to stop
///     run_with_shutdown(downloader).await;
/// }
/// ```
pub async fn run_with_shutdown(downloader: Downloader) {
    wait_for_signal().await;
    downloader.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C signal"),
            }
        }
        Err(e) => {
            // Restricted environments may refuse the handler
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for Ctrl+C only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
