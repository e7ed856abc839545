use super::test_helpers::{
    FakeRoute, FakeTransport, TestHarness, create_test_harness, create_test_harness_with, payload,
};
use super::{Downloader, DownloaderStats, Origin};
use crate::cache;
use crate::config::Config;
use crate::error::Error;
use crate::request::RequestState;
use std::sync::Arc;
use std::time::Duration;


/// Schedule `request` on behalf of `origin` with the harness callback
fn submit(h: &TestHarness, request: &Arc<crate::ImageRequest>, origin: Origin) {
    h.downloader
        .download_async(Arc::clone(request), origin, Arc::clone(&h.callback))
        .unwrap();
}
