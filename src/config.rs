//! Configuration types for image-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for [`Downloader`](crate::Downloader)
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding cached image files (default: "./image-cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Concurrent on-demand downloads (default: 3)
    #[serde(default = "default_interactive_concurrency")]
    pub interactive_concurrency: usize,

    /// Concurrent prefetch downloads (default: 1)
    #[serde(default = "default_prefetch_concurrency")]
    pub prefetch_concurrency: usize,

    /// Number of I/O buffers retained for reuse (default: 4)
    #[serde(default = "default_buffer_pool_capacity")]
    pub buffer_pool_capacity: usize,

    /// Size in bytes of each I/O buffer (default: 2048)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Fraction of the content length after which invalidation no longer
    /// aborts a transfer (default: 0.5)
    ///
    /// Bodies of unknown length are never aborted.
    #[serde(default = "default_cancel_threshold")]
    pub cancel_threshold: f64,

    /// Whole-request timeout applied by [`HttpTransport`](crate::HttpTransport)
    /// (None = no timeout)
    #[serde(default, with = "optional_secs")]
    pub request_timeout: Option<Duration>,

    /// User-Agent header sent by [`HttpTransport`](crate::HttpTransport)
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            interactive_concurrency: default_interactive_concurrency(),
            prefetch_concurrency: default_prefetch_concurrency(),
            buffer_pool_capacity: default_buffer_pool_capacity(),
            buffer_size: default_buffer_size(),
            cancel_threshold: default_cancel_threshold(),
            request_timeout: None,
            user_agent: None,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_json_str(&content)
    }

    /// Check that the settings describe a usable downloader
    pub fn validate(&self) -> Result<()> {
        if self.interactive_concurrency == 0 {
            return Err(Error::config(
                "interactive_concurrency",
                "interactive_concurrency must be at least 1",
            ));
        }
        if self.prefetch_concurrency == 0 {
            return Err(Error::config(
                "prefetch_concurrency",
                "prefetch_concurrency must be at least 1",
            ));
        }
        if self.buffer_size == 0 {
            return Err(Error::config("buffer_size", "buffer_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.cancel_threshold) {
            return Err(Error::config(
                "cancel_threshold",
                format!(
                    "cancel_threshold must be within [0, 1], got {}",
                    self.cancel_threshold
                ),
            ));
        }
        Ok(())
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./image-cache")
}

fn default_interactive_concurrency() -> usize {
    3
}

fn default_prefetch_concurrency() -> usize {
    1
}

fn default_buffer_pool_capacity() -> usize {
    4
}

fn default_buffer_size() -> usize {
    2048
}

fn default_cancel_threshold() -> f64 {
    0.5
}

/// Serialize `Option<Duration>` as whole seconds
mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
