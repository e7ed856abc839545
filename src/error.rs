//! Error types for image-dl
//!
//! This module provides the error taxonomy for the library:
//! - Argument and configuration validation (spec builder, config loading)
//! - Download failures classified as transport, transfer or commit errors
//! - Collaborator failures (decode, resource lookups)
//!
//! Download errors never cross the completion boundary. Workers log them and
//! report `downloaded = false` instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for image-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for image-dl
#[derive(Debug, Error)]
pub enum Error {
    /// An argument was outside its allowed domain (e.g. `max_density <= 0.5`)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "cache_dir")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error raised by the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The image URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A resource-keyed dimension lookup found nothing for the key
    #[error("unknown dimension resource: {0}")]
    UnknownResource(String),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// The decode collaborator failed
    #[error("decode error: {0}")]
    Decode(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Download failures, one variant per failure class
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The server answered with a non-2xx status
    #[error("{code}: {message}")]
    Status {
        /// HTTP status code returned by the transport
        code: u16,
        /// Reason phrase or error message returned by the transport
        message: String,
    },

    /// Reading the body or writing the temp file failed
    #[error("transfer failed: {0}")]
    Transfer(#[source] std::io::Error),

    /// The server answered with an empty body
    #[error("empty response body")]
    EmptyBody,

    /// The body was written completely but moving it into place failed
    #[error("failed to rename {from} to {to}: {source}")]
    Commit {
        /// The temp file that holds the downloaded bytes
        from: PathBuf,
        /// The final cache path
        to: PathBuf,
        /// The underlying rename error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// HTTP-like status code associated with this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Download(DownloadError::Status { code, .. }) => Some(*code),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
