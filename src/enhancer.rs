//! URL enhancement strategies
//!
//! An enhancer maps a base image URL plus an [`ImageLoadSpec`] to the URL that
//! is actually fetched, letting a resizing backend produce the requested size
//! and format server-side. Enhancers must be pure: same input, same output, no
//! side effects, and any query string already on the URL is preserved.

use crate::spec::ImageLoadSpec;
use std::fmt::Write;

/// Strategy translating a base URL and spec into a fetch URL
pub trait UriEnhancer: Send + Sync {
    /// Return the URL to fetch for `url` loaded under `spec`
    fn enhance(&self, url: &str, spec: &ImageLoadSpec) -> String;
}

/// Enhancer that returns the URL unchanged
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityEnhancer;

impl UriEnhancer for IdentityEnhancer {
    fn enhance(&self, url: &str, _spec: &ImageLoadSpec) -> String {
        url.to_string()
    }
}

/// Enhancer for imgix-style backends
///
/// Appends `auto={format}&fit=crop&w={width}&h={height}` to the URL.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImgixEnhancer;

impl UriEnhancer for ImgixEnhancer {
    fn enhance(&self, url: &str, spec: &ImageLoadSpec) -> String {
        let mut out = String::with_capacity(url.len() + 48);
        out.push_str(url);
        out.push(if url.contains('?') { '&' } else { '?' });
        // Writing to a String cannot fail
        let _ = write!(
            out,
            "auto={}&fit=crop&w={}&h={}",
            spec.format().as_str(),
            spec.width(),
            spec.height()
        );
        out
    }
}
