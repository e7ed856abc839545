//! Image load specifications
//!
//! An [`ImageLoadSpec`] describes the image a consumer wants back: its pixel
//! dimensions, encoding format and in-memory pixel layout. Specs are created
//! only through [`ImageLoadSpecBuilder`], which applies density scaling, and are
//! immutable afterwards. The derived [`key`](ImageLoadSpec::key) partitions the
//! disk cache so the same URL loaded under two specs is cached twice.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default cap on display density used when sizing images
pub const DEFAULT_MAX_DENSITY: f32 = 1.5;

/// Densities at or below this value are rejected by [`ImageLoadSpecBuilder::max_density`]
const MIN_MAX_DENSITY: f32 = 0.5;

/// Display characteristics of the device images are loaded for
///
/// Set once at startup and passed to every
/// [`ImageLoadSpecBuilder`]; never mutated afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayMetrics {
    /// Logical density (1.0 = baseline, 2.0 = twice as many pixels per inch)
    pub density: f32,
    /// Display width in pixels
    pub width: u32,
    /// Display height in pixels
    pub height: u32,
}

impl Default for DisplayMetrics {
    fn default() -> Self {
        Self {
            density: 1.0,
            width: 0,
            height: 0,
        }
    }
}

/// Encoding format requested from the image backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JPEG (default)
    #[default]
    Jpeg,
    /// PNG
    Png,
    /// WebP
    Webp,
}

impl Format {
    /// Lowercase name used in query strings and cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Webp => "webp",
        }
    }
}

/// Pixel layout the decoder should produce
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelConfig {
    /// 4 bytes per pixel (default)
    #[default]
    Argb8888,
    /// 2 bytes per pixel, no alpha
    Rgb565,
    /// 2 bytes per pixel with 4-bit alpha
    Argb4444,
    /// 1 byte per pixel, alpha only
    Alpha8,
}

impl PixelConfig {
    /// Bytes occupied by a single decoded pixel
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelConfig::Argb8888 => 4,
            PixelConfig::Rgb565 | PixelConfig::Argb4444 => 2,
            PixelConfig::Alpha8 => 1,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            PixelConfig::Argb8888 => "argb8888",
            PixelConfig::Rgb565 => "rgb565",
            PixelConfig::Argb4444 => "argb4444",
            PixelConfig::Alpha8 => "alpha8",
        }
    }
}

/// Lookup of named dimension resources (e.g. "avatar_size" -> 48px)
pub trait DimensionResources: Send + Sync {
    /// Pixel size for the named dimension, or `None` if the key is unknown
    fn dimension_px(&self, key: &str) -> Option<u32>;
}

/// Immutable description of the desired output image
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ImageLoadSpec {
    width: u32,
    height: u32,
    format: Format,
    pixel_config: PixelConfig,
    key: String,
}

impl ImageLoadSpec {
    fn new(width: u32, height: u32, format: Format, pixel_config: PixelConfig) -> Self {
        let key = format!(
            "{}x{}_{}_{}",
            width,
            height,
            format.as_str(),
            pixel_config.as_str()
        );
        Self {
            width,
            height,
            format,
            pixel_config,
            key,
        }
    }

    /// Start building a spec for the given display
    pub fn builder(metrics: DisplayMetrics) -> ImageLoadSpecBuilder {
        ImageLoadSpecBuilder::new(metrics)
    }

    /// Width in pixels (0 when unbound)
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels (0 when unbound)
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Encoding format
    pub fn format(&self) -> Format {
        self.format
    }

    /// Decoded pixel layout
    pub fn pixel_config(&self) -> PixelConfig {
        self.pixel_config
    }

    /// Whether the image is loaded at the source's native size
    pub fn is_unbound(&self) -> bool {
        self.width == 0 && self.height == 0
    }

    /// Cache partition key, deterministic in all other fields
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ImageLoadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Builder for [`ImageLoadSpec`]
///
/// Defaults: JPEG format, max density 1.5, 4-byte ARGB pixels. Width and height
/// start unset and must be given before [`build`](Self::build).
#[derive(Clone, Debug)]
pub struct ImageLoadSpecBuilder {
    metrics: DisplayMetrics,
    width: Option<u32>,
    height: Option<u32>,
    max_density: f32,
    format: Format,
    pixel_config: PixelConfig,
}

impl ImageLoadSpecBuilder {
    /// Create a builder for the given display
    pub fn new(metrics: DisplayMetrics) -> Self {
        Self {
            metrics,
            width: None,
            height: None,
            max_density: DEFAULT_MAX_DENSITY,
            format: Format::default(),
            pixel_config: PixelConfig::default(),
        }
    }

    /// The format of the image to download
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// The pixel layout to decode into
    pub fn pixel_config(mut self, pixel_config: PixelConfig) -> Self {
        self.pixel_config = pixel_config;
        self
    }

    /// Width and height in pixels
    pub fn dimension(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Square image of the given size
    pub fn square(self, size: u32) -> Self {
        self.dimension(size, size)
    }

    /// Width and height of the display
    pub fn display_dimension(self) -> Self {
        let (w, h) = (self.metrics.width, self.metrics.height);
        self.dimension(w, h)
    }

    /// Load at the downloaded image's own size
    pub fn unbound(self) -> Self {
        self.dimension(0, 0)
    }

    /// Width in pixels
    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    /// Height in pixels
    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    /// Square image sized by a named dimension resource
    pub fn square_by_resource(self, resources: &dyn DimensionResources, key: &str) -> Result<Self> {
        let size = lookup(resources, key)?;
        Ok(self.square(size))
    }

    /// Width and height from two named dimension resources
    pub fn dimension_by_resource(
        self,
        resources: &dyn DimensionResources,
        width_key: &str,
        height_key: &str,
    ) -> Result<Self> {
        let width = lookup(resources, width_key)?;
        let height = lookup(resources, height_key)?;
        Ok(self.dimension(width, height))
    }

    /// Width from a named dimension resource
    pub fn width_by_resource(self, resources: &dyn DimensionResources, key: &str) -> Result<Self> {
        let width = lookup(resources, key)?;
        Ok(self.width(width))
    }

    /// Height from a named dimension resource
    pub fn height_by_resource(self, resources: &dyn DimensionResources, key: &str) -> Result<Self> {
        let height = lookup(resources, key)?;
        Ok(self.height(height))
    }

    /// Cap on the density images are loaded at; must be greater than 0.5
    pub fn max_density(mut self, max_density: f32) -> Result<Self> {
        if max_density.is_nan() || max_density <= MIN_MAX_DENSITY {
            return Err(Error::InvalidArgument(format!(
                "max density must be > {MIN_MAX_DENSITY}, got {max_density}"
            )));
        }
        self.max_density = max_density;
        Ok(self)
    }

    /// Validate the dimensions and create the spec, scaled down for dense displays
    pub fn build(&self) -> Result<ImageLoadSpec> {
        let (Some(width), Some(height)) = (self.width, self.height) else {
            return Err(Error::InvalidArgument(
                "width and height must be set".to_string(),
            ));
        };
        if (width == 0) != (height == 0) {
            return Err(Error::InvalidArgument(format!(
                "width and height must be either unbound or both positive, got {width}x{height}"
            )));
        }

        let adj = self.density_adjustment();
        let scale = |v: u32| (f64::from(v) * adj).floor() as u32;
        Ok(ImageLoadSpec::new(
            scale(width),
            scale(height),
            self.format,
            self.pixel_config,
        ))
    }

    fn density_adjustment(&self) -> f64 {
        let density = self.metrics.density;
        if density > self.max_density {
            f64::from(self.max_density) / f64::from(density)
        } else {
            1.0
        }
    }
}

fn lookup(resources: &dyn DimensionResources, key: &str) -> Result<u32> {
    resources
        .dimension_px(key)
        .ok_or_else(|| Error::UnknownResource(key.to_string()))
}
