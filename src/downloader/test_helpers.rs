//! Shared test helpers for creating Downloader instances with scripted collaborators.

use crate::config::Config;
use crate::decode::{Decoder, MemoryPool, NoOpMemoryPool};
use crate::downloader::{Completion, DownloadCallback, Downloader};
use crate::enhancer::IdentityEnhancer;
use crate::error::{Error, Result};
use crate::observe::MemorySink;
use crate::request::ImageRequest;
use crate::spec::{DisplayMetrics, ImageLoadSpec};
use crate::transport::{HttpResponse, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncRead, ReadBuf};

/// Called with the number of body bytes handed out so far
pub(crate) type ReadHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Response body served in fixed-size chunks, optionally failing part-way
pub(crate) struct ScriptedBody {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    fail_at: Option<usize>,
    on_read: Option<ReadHook>,
}

impl AsyncRead for ScriptedBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if let Some(fail_at) = this.fail_at {
            if this.pos >= fail_at {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
        }
        let n = (this.data.len() - this.pos)
            .min(this.chunk)
            .min(buf.remaining());
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        if n > 0 {
            if let Some(ref hook) = this.on_read {
                hook(this.pos as u64);
            }
        }
        Poll::Ready(Ok(()))
    }
}

/// Scripted answer for one URL
#[derive(Clone)]
pub(crate) struct FakeRoute {
    code: u16,
    error_message: String,
    body: Vec<u8>,
    content_length: Option<u64>,
    chunk: usize,
    fail_at: Option<usize>,
    on_read: Option<ReadHook>,
}

impl FakeRoute {
    /// 200 with `body`, correct content length
    pub(crate) fn ok(body: Vec<u8>) -> Self {
        Self {
            code: 200,
            error_message: String::new(),
            content_length: Some(body.len() as u64),
            body,
            chunk: 100,
            fail_at: None,
            on_read: None,
        }
    }

    /// Error status with an empty body
    pub(crate) fn status(code: u16, message: &str) -> Self {
        Self {
            code,
            error_message: message.to_string(),
            body: Vec::new(),
            content_length: Some(0),
            chunk: 100,
            fail_at: None,
            on_read: None,
        }
    }

    pub(crate) fn unknown_length(mut self) -> Self {
        self.content_length = None;
        self
    }

    pub(crate) fn chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    pub(crate) fn fail_at(mut self, offset: usize) -> Self {
        self.fail_at = Some(offset);
        self
    }

    pub(crate) fn on_read(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_read = Some(Arc::new(hook));
        self
    }
}

/// In-memory [`Transport`] answering from a route table
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<HashMap<String, FakeRoute>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hold every request for `delay` before answering
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn route(&self, url: &str, route: FakeRoute) {
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, url: &str) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let route = self.routes.lock().unwrap().get(url).cloned();
        let Some(route) = route else {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("no route for {url}"),
            )));
        };
        Ok(HttpResponse {
            code: route.code,
            error_message: route.error_message,
            content_length: route.content_length,
            body: Box::new(ScriptedBody {
                data: route.body,
                pos: 0,
                chunk: route.chunk,
                fail_at: route.fail_at,
                on_read: route.on_read,
            }),
        })
    }
}

/// [`Decoder`] that records which files it was asked to decode
#[derive(Default)]
pub(crate) struct RecordingDecoder {
    decoded: Mutex<Vec<(String, PathBuf, usize)>>,
    fail: AtomicBool,
}

impl RecordingDecoder {
    /// (url, file, file length at decode time) per call
    pub(crate) fn decoded(&self) -> Vec<(String, PathBuf, usize)> {
        self.decoded.lock().unwrap().clone()
    }

    pub(crate) fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Decoder for RecordingDecoder {
    async fn decode(
        &self,
        _pool: &dyn MemoryPool,
        request: &ImageRequest,
        file: &Path,
        _spec: &ImageLoadSpec,
    ) -> Result<()> {
        let len = std::fs::read(file).map(|b| b.len()).unwrap_or(0);
        self.decoded
            .lock()
            .unwrap()
            .push((request.url().to_string(), file.to_path_buf(), len));
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(Error::Decode("corrupt image".to_string()));
        }
        Ok(())
    }
}

/// Everything a downloader test needs to inspect
pub(crate) struct TestHarness {
    pub(crate) downloader: Downloader,
    pub(crate) transport: Arc<FakeTransport>,
    pub(crate) decoder: Arc<RecordingDecoder>,
    pub(crate) sink: MemorySink,
    pub(crate) completions: Arc<Mutex<Vec<Completion>>>,
    pub(crate) callback: Arc<dyn DownloadCallback>,
    /// Keeps the cache directory alive
    pub(crate) temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub(crate) fn cache_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A request cached in the harness directory; URL is fetched as-is
    pub(crate) fn request(&self, url: &str, prefetch: bool) -> Arc<ImageRequest> {
        let spec = ImageLoadSpec::builder(DisplayMetrics::default())
            .square(64)
            .build()
            .unwrap();
        Arc::new(
            ImageRequest::new(url, spec, &IdentityEnhancer, self.cache_dir(), prefetch).unwrap(),
        )
    }

    pub(crate) fn completions(&self) -> Vec<Completion> {
        self.completions.lock().unwrap().clone()
    }

    /// Wait for the engine to drain, failing the test after five seconds
    pub(crate) async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.downloader.wait_idle())
            .await
            .expect("downloader did not become idle");
    }
}

/// Helper to create a test Downloader around `transport`.
pub(crate) async fn create_test_harness(transport: FakeTransport) -> TestHarness {
    create_test_harness_with(transport, Config::default()).await
}

/// Helper to create a test Downloader with a custom configuration.
/// The cache directory is always replaced by a fresh tempdir.
pub(crate) async fn create_test_harness_with(
    transport: FakeTransport,
    mut config: Config,
) -> TestHarness {
    let temp_dir = tempdir().unwrap();
    config.cache_dir = temp_dir.path().to_path_buf();

    let transport = Arc::new(transport);
    let decoder = Arc::new(RecordingDecoder::default());
    let sink = MemorySink::new();
    let memory_pool: Arc<dyn MemoryPool> = Arc::new(NoOpMemoryPool);

    let downloader = Downloader::new(
        config,
        transport.clone(),
        decoder.clone(),
        memory_pool,
    )
    .await
    .unwrap()
    .with_operation_sink(Arc::new(sink.clone()));

    let completions = Arc::new(Mutex::new(Vec::new()));
    let completions_clone = Arc::clone(&completions);
    let callback: Arc<dyn DownloadCallback> = Arc::new(move |c: &Completion| {
        completions_clone.lock().unwrap().push(c.clone());
    });

    TestHarness {
        downloader,
        transport,
        decoder,
        sink,
        completions,
        callback,
        temp_dir,
    }
}

/// Deterministic payload of `len` bytes
pub(crate) fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
