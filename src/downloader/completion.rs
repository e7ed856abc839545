//! Completion context.
//!
//! Workers post their results here instead of calling back directly. A single
//! dispatcher task drains the channel and invokes each callback in posting
//! order, so consumers never see two completions concurrently.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Notify, mpsc};

use crate::request::ImageRequest;

/// Result of one executed download
#[derive(Clone, Debug)]
pub struct Completion {
    /// The request the worker executed
    pub request: Arc<ImageRequest>,
    /// Whether the image is now in the cache
    pub downloaded: bool,
    /// Whether the consumer invalidated the request along the way
    pub canceled: bool,
}

/// Consumer callback invoked from the completion context
pub trait DownloadCallback: Send + Sync {
    /// Called once per executed download, never concurrently with another call
    fn on_complete(&self, completion: &Completion);
}

impl<F> DownloadCallback for F
where
    F: Fn(&Completion) + Send + Sync,
{
    fn on_complete(&self, completion: &Completion) {
        self(completion)
    }
}

struct Posted {
    completion: Completion,
    callback: Arc<dyn DownloadCallback>,
}

#[derive(Clone)]
pub(crate) struct CompletionContext {
    tx: mpsc::UnboundedSender<Posted>,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl CompletionContext {
    /// Spawn the dispatcher; must be called from within a tokio runtime
    ///
    /// `drained` is notified after every delivered completion.
    pub(crate) fn start(drained: Arc<Notify>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Posted>();
        let pending = Arc::new(AtomicUsize::new(0));

        let dispatch_pending = Arc::clone(&pending);
        let dispatch_drained = Arc::clone(&drained);
        tokio::spawn(async move {
            while let Some(posted) = rx.recv().await {
                let Posted {
                    completion,
                    callback,
                } = posted;
                if catch_unwind(AssertUnwindSafe(|| callback.on_complete(&completion))).is_err() {
                    tracing::error!(
                        request = %completion.request,
                        "Download callback panicked"
                    );
                }
                dispatch_pending.fetch_sub(1, Ordering::AcqRel);
                dispatch_drained.notify_waiters();
            }
        });

        Self {
            tx,
            pending,
            drained,
        }
    }

    pub(crate) fn post(&self, completion: Completion, callback: Arc<dyn DownloadCallback>) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self
            .tx
            .send(Posted {
                completion,
                callback,
            })
            .is_err()
        {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.drained.notify_waiters();
            tracing::warn!("Completion context closed, dropping download result");
        }
    }

    /// Completions posted but not yet delivered
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::DisplayMetrics;
    use crate::enhancer::IdentityEnhancer;
    use crate::spec::ImageLoadSpec;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    fn request(n: usize) -> Arc<ImageRequest> {
        let spec = ImageLoadSpec::builder(DisplayMetrics::default())
            .square(8)
            .build()
            .unwrap();
        Arc::new(
            ImageRequest::new(
                format!("http://x/{n}"),
                spec,
                &IdentityEnhancer,
                Path::new("/cache"),
                false,
            )
            .unwrap(),
        )
    }

    fn panicking_callback(_: &Completion) {
        panic!("consumer bug")
    }

    async fn drain(ctx: &CompletionContext) {
        for _ in 0..500 {
            if ctx.pending() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("completions not delivered");
    }

    #[tokio::test]
    async fn test_completions_delivered_in_posting_order() {
        let ctx = CompletionContext::start(Arc::new(Notify::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let callback: Arc<dyn DownloadCallback> = Arc::new(move |c: &Completion| {
            seen_clone.lock().unwrap().push(c.request.url().to_string());
        });

        for n in 0..20 {
            ctx.post(
                Completion {
                    request: request(n),
                    downloaded: true,
                    canceled: false,
                },
                Arc::clone(&callback),
            );
        }

        drain(&ctx).await;
        let expected: Vec<String> = (0..20).map(|n| format!("http://x/{n}")).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_dispatcher() {
        let ctx = CompletionContext::start(Arc::new(Notify::new()));
        let delivered = Arc::new(AtomicUsize::new(0));

        ctx.post(
            Completion {
                request: request(0),
                downloaded: false,
                canceled: false,
            },
            Arc::new(panicking_callback),
        );
        let delivered_clone = Arc::clone(&delivered);
        ctx.post(
            Completion {
                request: request(1),
                downloaded: true,
                canceled: false,
            },
            Arc::new(move |_: &Completion| {
                delivered_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        drain(&ctx).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }
}
