//! Body transfer with smart cancellation.
//!
//! The body is streamed through a pooled buffer into `<target>_tmp` and renamed
//! onto the target only after end-of-stream. Invalidation stops the transfer at
//! the next read unless more than `cancel_threshold` of the advertised length
//! has already arrived; past that point the transfer runs to completion so the
//! bytes already paid for end up in the cache. Bodies of unknown length are
//! always read to the end. An empty body is an error and never reaches the
//! target path.
//!
//! The temp file is removed, the buffer returned and both streams closed on
//! every exit path.

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::buffer_pool::BufferPool;
use crate::cache;
use crate::error::{DownloadError, Result};
use crate::request::ImageRequest;
use crate::transport::BodyStream;

/// How a transfer that did not error ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransferOutcome {
    /// The full body is in the cache file, this many bytes
    Committed(u64),
    /// The request was invalidated below the threshold; nothing was kept
    Abandoned,
}

/// Whether another read should be issued
pub(crate) fn keep_reading(
    content_length: Option<u64>,
    bytes_so_far: u64,
    threshold: f64,
    valid: bool,
) -> bool {
    match content_length {
        None => true,
        Some(length) => valid || bytes_so_far as f64 > length as f64 * threshold,
    }
}

/// Stream `body` into the request's cache file
pub(crate) async fn transfer(
    request: &ImageRequest,
    mut body: BodyStream,
    content_length: Option<u64>,
    buffers: &BufferPool,
    threshold: f64,
) -> Result<TransferOutcome> {
    let target = request.file();
    let tmp = cache::temp_path(target);

    let streamed = stream_to_file(request, &mut body, content_length, &tmp, buffers, threshold).await;
    drop(body);

    let outcome = match streamed {
        Ok(Some(0)) => Err(DownloadError::EmptyBody.into()),
        Ok(Some(size)) => match tokio::fs::rename(&tmp, target).await {
            Ok(()) => {
                request.set_file_size(size);
                Ok(TransferOutcome::Committed(size))
            }
            Err(source) => {
                tracing::warn!(
                    from = %tmp.display(),
                    to = %target.display(),
                    error = %source,
                    "Failed to rename temp download file to target file"
                );
                Err(DownloadError::Commit {
                    from: tmp.clone(),
                    to: target.to_path_buf(),
                    source,
                }
                .into())
            }
        },
        Ok(None) => Ok(TransferOutcome::Abandoned),
        Err(e) => Err(e),
    };

    remove_temp(&tmp).await;
    outcome
}

/// Copy the body into `tmp`; `None` if the request was abandoned mid-way
async fn stream_to_file(
    request: &ImageRequest,
    body: &mut BodyStream,
    content_length: Option<u64>,
    tmp: &Path,
    buffers: &BufferPool,
    threshold: f64,
) -> Result<Option<u64>> {
    if let Some(parent) = tmp.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(DownloadError::Transfer)?;
    }
    let mut out = tokio::fs::File::create(tmp)
        .await
        .map_err(DownloadError::Transfer)?;
    let mut buffer = buffers.lease();
    let mut size: u64 = 0;

    loop {
        if !keep_reading(content_length, size, threshold, request.is_valid()) {
            tracing::debug!(
                request = %request,
                bytes = size,
                content_length = ?content_length,
                "Image download canceled mid-transfer"
            );
            return Ok(None);
        }

        let len = body
            .read(&mut buffer[..])
            .await
            .map_err(DownloadError::Transfer)?;
        if len == 0 {
            out.flush().await.map_err(DownloadError::Transfer)?;
            return Ok(Some(size));
        }

        out.write_all(&buffer[..len])
            .await
            .map_err(DownloadError::Transfer)?;
        size += len as u64;
    }
}

async fn remove_temp(tmp: &Path) {
    match tokio::fs::remove_file(tmp).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %tmp.display(), error = %e, "Failed to delete temp download file");
        }
    }
}
