//! Downloader fixtures backed by a real HTTP transport

use async_trait::async_trait;
use image_dl::{
    Completion, Config, Decoder, DisplayMetrics, DownloadCallback, Downloader, HttpTransport,
    ImageLoadSpec, ImageRequest, ImgixEnhancer, MemoryPool, MemorySink, NoOpMemoryPool, Origin,
    UriEnhancer,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Decoder that only counts the files it was handed
#[derive(Default)]
pub struct CountingDecoder {
    pub decoded: Mutex<Vec<String>>,
}

#[async_trait]
impl Decoder for CountingDecoder {
    async fn decode(
        &self,
        _pool: &dyn MemoryPool,
        request: &ImageRequest,
        file: &Path,
        _spec: &ImageLoadSpec,
    ) -> image_dl::Result<()> {
        assert!(file.is_file(), "decoder must only see committed files");
        self.decoded
            .lock()
            .unwrap()
            .push(request.url().to_string());
        Ok(())
    }
}

/// A downloader wired to [`HttpTransport`] with a temporary cache
pub struct HttpFixture {
    pub downloader: Downloader,
    pub decoder: Arc<CountingDecoder>,
    pub sink: MemorySink,
    pub completions: Arc<Mutex<Vec<Completion>>>,
    pub callback: Arc<dyn DownloadCallback>,
    pub temp_dir: TempDir,
}

impl HttpFixture {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config {
            cache_dir: temp_dir.path().join("cache"),
            request_timeout: Some(Duration::from_secs(10)),
            user_agent: Some("image-dl-tests".to_string()),
            ..Config::default()
        };
        let transport = Arc::new(HttpTransport::new(&config).unwrap());
        let decoder = Arc::new(CountingDecoder::default());
        let sink = MemorySink::new();

        let downloader = Downloader::new(
            config,
            transport,
            decoder.clone(),
            Arc::new(NoOpMemoryPool),
        )
        .await
        .unwrap()
        .with_operation_sink(Arc::new(sink.clone()));

        let completions = Arc::new(Mutex::new(Vec::new()));
        let completions_clone = Arc::clone(&completions);
        let callback: Arc<dyn DownloadCallback> = Arc::new(move |c: &Completion| {
            completions_clone.lock().unwrap().push(c.clone());
        });

        Self {
            downloader,
            decoder,
            sink,
            completions,
            callback,
            temp_dir,
        }
    }

    /// Request for a `size`x`size` JPEG, fetched through the imgix enhancer
    pub fn request(&self, url: &str, size: u32, prefetch: bool) -> Arc<ImageRequest> {
        self.request_with(url, size, prefetch, &ImgixEnhancer)
    }

    pub fn request_with(
        &self,
        url: &str,
        size: u32,
        prefetch: bool,
        enhancer: &dyn UriEnhancer,
    ) -> Arc<ImageRequest> {
        let spec = ImageLoadSpec::builder(DisplayMetrics::default())
            .square(size)
            .build()
            .unwrap();
        Arc::new(
            ImageRequest::new(
                url,
                spec,
                enhancer,
                &self.downloader.config().cache_dir,
                prefetch,
            )
            .unwrap(),
        )
    }

    pub fn submit(&self, request: &Arc<ImageRequest>, origin: Origin) {
        self.downloader
            .download_async(Arc::clone(request), origin, Arc::clone(&self.callback))
            .unwrap();
    }

    pub fn completions(&self) -> Vec<Completion> {
        self.completions.lock().unwrap().clone()
    }

    pub fn decoded(&self) -> Vec<String> {
        self.decoder.decoded.lock().unwrap().clone()
    }

    /// Wait for all scheduled work, failing after ten seconds
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.downloader.wait_idle())
            .await
            .expect("downloader did not become idle");
    }
}

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}
