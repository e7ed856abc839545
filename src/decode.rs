//! Decode collaborator seam
//!
//! Pixel decoding happens outside this crate. After a non-prefetch download
//! succeeds and the request is still valid, the downloader hands the cached file
//! to a [`Decoder`] together with the consumer's [`MemoryPool`], which it never
//! inspects.

use crate::error::Result;
use crate::request::ImageRequest;
use crate::spec::ImageLoadSpec;
use async_trait::async_trait;
use std::any::Any;
use std::path::Path;

/// Pool of reusable decode targets (bitmaps etc.), opaque to the downloader
///
/// Decoders recover their concrete pool type by upcasting to `&dyn Any` and
/// downcasting.
pub trait MemoryPool: Any + Send + Sync {}

/// [`MemoryPool`] for decoders that do not recycle memory
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpMemoryPool;

impl MemoryPool for NoOpMemoryPool {}

/// Turns a cached image file into the consumer's in-memory representation
#[async_trait]
pub trait Decoder: Send + Sync {
    /// Decode `file` for `request` according to `spec`
    ///
    /// # Errors
    ///
    /// Decode failures are logged by the downloader and not retried.
    async fn decode(
        &self,
        pool: &dyn MemoryPool,
        request: &ImageRequest,
        file: &Path,
        spec: &ImageLoadSpec,
    ) -> Result<()>;
}
