//! Per-request lifecycle state
//!
//! An [`ImageRequest`] is shared (behind an `Arc`) between the consumer that
//! issued it and the [`Downloader`](crate::Downloader) workers that may execute
//! it. Three flags coordinate them:
//!
//! - `download_started` is the single-winner gate. The first caller of
//!   [`start_download`](ImageRequest::start_download) gets `true`; everyone else
//!   gets `false` and must not touch the download path.
//! - `valid` is cleared by the consumer once it no longer wants the result.
//!   Workers poll it at fixed checkpoints; nothing is preempted.
//! - `prefetch` is cleared by [`promote`](ImageRequest::promote) when an
//!   on-demand load arrives for a request queued as a prefetch.

use crate::cache;
use crate::enhancer::UriEnhancer;
use crate::error::Result;
use crate::spec::ImageLoadSpec;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

/// Lifecycle state of an [`ImageRequest`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    /// Constructed, no worker has claimed it
    Created,
    /// A worker won the gate and is executing the download
    DownloadStarted,
    /// The image was written to the cache
    Completed,
    /// The consumer invalidated the request before the file was written
    Canceled,
    /// The download failed (transport, I/O or commit error)
    Failed,
}

impl RequestState {
    fn to_u8(self) -> u8 {
        match self {
            RequestState::Created => 0,
            RequestState::DownloadStarted => 1,
            RequestState::Completed => 2,
            RequestState::Canceled => 3,
            RequestState::Failed => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => RequestState::Created,
            1 => RequestState::DownloadStarted,
            2 => RequestState::Completed,
            3 => RequestState::Canceled,
            _ => RequestState::Failed,
        }
    }

    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Canceled | RequestState::Failed
        )
    }
}

/// A single image load: what to fetch, where to cache it, and its progress
pub struct ImageRequest {
    url: String,
    enhanced_url: String,
    spec: ImageLoadSpec,
    file: PathBuf,
    prefetch: AtomicBool,
    download_started: AtomicBool,
    valid: AtomicBool,
    file_size: AtomicU64,
    state: AtomicU8,
}

impl ImageRequest {
    /// Create a request for `url` under `spec`, cached inside `cache_dir`
    ///
    /// The enhanced URL is computed once here. Fails if `url` is not an
    /// absolute URL.
    pub fn new(
        url: impl Into<String>,
        spec: ImageLoadSpec,
        enhancer: &dyn UriEnhancer,
        cache_dir: &Path,
        prefetch: bool,
    ) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url)?;
        let enhanced_url = enhancer.enhance(&url, &spec);
        let file = cache::cache_path(cache_dir, &url, &spec);
        Ok(Self {
            url,
            enhanced_url,
            spec,
            file,
            prefetch: AtomicBool::new(prefetch),
            download_started: AtomicBool::new(false),
            valid: AtomicBool::new(true),
            file_size: AtomicU64::new(0),
            state: AtomicU8::new(RequestState::Created.to_u8()),
        })
    }

    /// The URL the consumer asked for
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL actually fetched
    pub fn enhanced_url(&self) -> &str {
        &self.enhanced_url
    }

    /// The requested output spec
    pub fn spec(&self) -> &ImageLoadSpec {
        &self.spec
    }

    /// Final cache path of the image
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Whether the request only warms the cache (no decode)
    pub fn is_prefetch(&self) -> bool {
        self.prefetch.load(Ordering::Acquire)
    }

    /// Turn a prefetch into an on-demand load; decode will run after download
    pub fn promote(&self) {
        self.prefetch.store(false, Ordering::Release);
    }

    /// Whether the consumer still wants the result
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Tell workers the result is no longer needed
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Claim the download; `true` for exactly one caller over the request's life
    pub fn start_download(&self) -> bool {
        let won = self
            .download_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.state
                .store(RequestState::DownloadStarted.to_u8(), Ordering::Release);
        }
        won
    }

    /// Whether some worker already claimed the download
    pub fn is_download_started(&self) -> bool {
        self.download_started.load(Ordering::Acquire)
    }

    /// Bytes written to the cache file (0 until completed)
    pub fn file_size(&self) -> u64 {
        self.file_size.load(Ordering::Acquire)
    }

    /// Current lifecycle state
    pub fn state(&self) -> RequestState {
        RequestState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the final cache file is present on disk
    pub fn is_cached(&self) -> bool {
        self.file.is_file()
    }

    pub(crate) fn set_file_size(&self, size: u64) {
        self.file_size.store(size, Ordering::Release);
    }

    pub(crate) fn finish(&self, state: RequestState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }
}

impl fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRequest")
            .field("url", &self.url)
            .field("spec", &self.spec.key())
            .field("prefetch", &self.is_prefetch())
            .field("valid", &self.is_valid())
            .field("state", &self.state())
            .field("file_size", &self.file_size())
            .finish()
    }
}

impl fmt::Display for ImageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.url, self.spec.key())
    }
}
