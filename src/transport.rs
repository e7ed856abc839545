//! Transport collaborator
//!
//! The downloader never talks HTTP directly. It asks a [`Transport`] to execute
//! a GET and receives the status, the advertised length and a streaming body.
//! Timeouts, redirects and TLS are the transport's business.

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

/// Streaming response body
pub type BodyStream = Box<dyn AsyncRead + Send + Unpin>;

/// Response headers plus an unread body
pub struct HttpResponse {
    /// HTTP status code
    pub code: u16,
    /// Reason phrase for non-success codes (empty otherwise)
    pub error_message: String,
    /// Advertised body length, `None` when unknown
    pub content_length: Option<u64>,
    /// The body, read incrementally by the downloader
    pub body: BodyStream,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("code", &self.code)
            .field("error_message", &self.error_message)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Issues image requests on behalf of the downloader
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a GET for `url`, returning once headers are available
    ///
    /// # Errors
    ///
    /// Returns an error if no response could be obtained at all (DNS, connect,
    /// TLS, timeout). Non-2xx responses are not errors at this level.
    async fn execute(&self, url: &str) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a `reqwest` client
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client honoring the timeout and user agent in `config`
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(ref user_agent) = config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wrap an already configured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        let error_message = if status.is_success() {
            String::new()
        } else {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string())
        };
        let content_length = response.content_length();

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let body: BodyStream = Box::new(StreamReader::new(Box::pin(stream)));

        Ok(HttpResponse {
            code: status.as_u16(),
            error_message,
            content_length,
            body,
        })
    }
}
