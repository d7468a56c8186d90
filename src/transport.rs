//! Transport collaborator
//!
//! The transfer task only needs four things from the network: a status code,
//! an optional content length, a byte stream, and a way to close. This module
//! defines that seam and the default HTTP implementation on top of reqwest.

use crate::error::Result;

use async_trait::async_trait;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Byte stream handed to the transfer task
pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// HTTP status code for a partial (range) response
pub const PARTIAL_CONTENT: u16 = 206;

/// Everything a transport needs to open one connection
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Ask for the resource starting at this byte offset
    pub range_start: Option<u64>,
}

/// Opens connections for transfer tasks
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and return once response headers are available
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Connection>>;
}

/// One open response
#[async_trait]
pub trait Connection: Send {
    /// Response status code
    fn status_code(&self) -> u16;

    /// Advertised body length, if any
    fn content_length(&self) -> Option<u64>;

    /// URL the response came from after redirects
    fn final_url(&self) -> Option<&str> {
        None
    }

    /// Take the body stream. `None` means there is nothing to transfer.
    fn take_body(&mut self) -> Option<BodyReader>;

    /// Release the underlying connection
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::{BodyReader, ConnectRequest, Connection, Transport};
    use crate::config::DownloaderConfig;
    use crate::error::{EngineError, Result};

    use async_trait::async_trait;
    use futures::TryStreamExt;
    use reqwest::header::RANGE;
    use reqwest::{Client, Response};
    use tokio_util::io::StreamReader;

    /// reqwest-backed transport sharing one connection pool
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: Client,
    }

    impl HttpTransport {
        /// Build a client from the downloader configuration
        pub fn new(config: &DownloaderConfig) -> Result<Self> {
            let mut builder = Client::builder()
                .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
                .user_agent(config.user_agent.clone())
                .pool_max_idle_per_host(8);

            if config.connect_timeout_ms > 0 {
                builder = builder.connect_timeout(config.connect_timeout_duration());
            }

            let client = builder
                .build()
                .map_err(|e| EngineError::Internal(format!("Failed to create HTTP client: {}", e)))?;

            Ok(Self { client })
        }

        /// Use a preconfigured client
        pub fn with_client(client: Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Connection>> {
            let mut builder = self.client.get(&request.url);

            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            if let Some(start) = request.range_start {
                builder = builder.header(RANGE, format!("bytes={}-", start));
            }

            let response = builder.send().await?;
            tracing::debug!(
                url = %request.url,
                status = response.status().as_u16(),
                "HTTP response received"
            );

            Ok(Box::new(HttpConnection::new(response)))
        }
    }

    struct HttpConnection {
        status: u16,
        content_length: Option<u64>,
        final_url: String,
        response: Option<Response>,
    }

    impl HttpConnection {
        fn new(response: Response) -> Self {
            Self {
                status: response.status().as_u16(),
                content_length: response.content_length(),
                final_url: response.url().to_string(),
                response: Some(response),
            }
        }
    }

    #[async_trait]
    impl Connection for HttpConnection {
        fn status_code(&self) -> u16 {
            self.status
        }

        fn content_length(&self) -> Option<u64> {
            self.content_length
        }

        fn final_url(&self) -> Option<&str> {
            Some(&self.final_url)
        }

        fn take_body(&mut self) -> Option<BodyReader> {
            let response = self.response.take()?;
            let stream = response.bytes_stream().map_err(|e| {
                let kind = if e.is_timeout() {
                    std::io::ErrorKind::TimedOut
                } else {
                    std::io::ErrorKind::Other
                };
                std::io::Error::new(kind, e)
            });
            Some(Box::pin(StreamReader::new(stream)))
        }

        async fn close(&mut self) -> Result<()> {
            // Dropping an unread response returns the socket to the pool or closes it
            self.response.take();
            Ok(())
        }
    }
}
