//! Per-request download algorithm executed inside a pool worker.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use super::completion::{Completion, DownloadCallback};
use super::transfer::{self, TransferOutcome};
use super::{Downloader, Origin};
use crate::error::{DownloadError, Error};
use crate::observe::OperationRecord;
use crate::request::{ImageRequest, RequestState};

/// What happened to a request whose gate this worker won
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DownloadOutcome {
    pub(crate) downloaded: bool,
    pub(crate) canceled: bool,
}

impl Downloader {
    /// Worker entry point: pass the gate, download, post the completion
    pub(crate) async fn run_download(
        &self,
        request: Arc<ImageRequest>,
        origin: Origin,
        callback: Arc<dyn DownloadCallback>,
    ) {
        // A promoted request belongs to its on-demand worker; the queued prefetch steps aside
        let eligible = match origin {
            Origin::Prefetch => request.is_prefetch(),
            Origin::OnDemand => true,
        };
        if !(eligible && request.start_download()) {
            tracing::debug!(request = %request, ?origin, "Image request download already handled");
            return;
        }

        tracing::debug!(request = %request, ?origin, "Start image request download");
        let outcome = self.download(&request).await;

        let state = if outcome.downloaded {
            RequestState::Completed
        } else if outcome.canceled {
            RequestState::Canceled
        } else {
            RequestState::Failed
        };
        request.finish(state);

        self.completions.post(
            Completion {
                request,
                downloaded: outcome.downloaded,
                canceled: outcome.canceled,
            },
            callback,
        );
    }

    /// Fetch, store and (for on-demand requests) decode the image
    pub(crate) async fn download(&self, request: &ImageRequest) -> DownloadOutcome {
        let start = Instant::now();
        let started_at = Utc::now();
        let mut status_code: u16 = 0;
        let mut error: Option<Error> = None;
        let mut downloaded = false;

        let mut canceled = !request.is_valid();
        if !canceled {
            match self.transport.execute(request.enhanced_url()).await {
                Ok(response) if response.code < 300 => {
                    status_code = response.code;
                    canceled = !request.is_valid();
                    if !canceled {
                        match transfer::transfer(
                            request,
                            response.body,
                            response.content_length,
                            &self.buffers,
                            self.config.cancel_threshold,
                        )
                        .await
                        {
                            Ok(TransferOutcome::Committed(_)) => downloaded = true,
                            Ok(TransferOutcome::Abandoned) => {}
                            Err(e) => {
                                tracing::error!(request = %request, error = %e, "Failed to download image");
                                error = Some(e);
                            }
                        }
                        canceled = !request.is_valid();
                    }
                }
                Ok(response) => {
                    status_code = response.code;
                    tracing::error!(
                        request = %request,
                        code = response.code,
                        message = %response.error_message,
                        "Failed to download image"
                    );
                    error = Some(
                        DownloadError::Status {
                            code: response.code,
                            message: response.error_message,
                        }
                        .into(),
                    );
                }
                Err(e) => {
                    tracing::error!(request = %request, error = %e, "Failed to download image");
                    error = Some(e);
                }
            }
        }

        if downloaded || error.is_some() {
            self.sink.record(&OperationRecord {
                url: request.enhanced_url().to_string(),
                spec_key: request.spec().key().to_string(),
                status_code,
                elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                bytes: request.file_size(),
                error: error.as_ref().map(ToString::to_string),
                started_at,
            });
        }

        // Downloaded and still wanted: build the in-memory image
        if downloaded {
            canceled = !request.is_valid();
            if !canceled && !request.is_prefetch() {
                if let Err(e) = self
                    .decoder
                    .decode(
                        self.memory_pool.as_ref(),
                        request,
                        request.file(),
                        request.spec(),
                    )
                    .await
                {
                    tracing::error!(request = %request, error = %e, "Failed to decode image");
                }
            }
        }

        DownloadOutcome {
            downloaded,
            canceled,
        }
    }
}
