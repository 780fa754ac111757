//! HTTP transport used by the fetchers.
//!
//! The [`Transport`] trait is the seam between download logic and the network.
//! [`HttpTransport`] is the production implementation on a blocking `reqwest`
//! client; tests substitute transports that inject failures or count requests.

use std::io::{Read, Write};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{
    HeaderMap, ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, RANGE,
};
use reqwest::redirect::Policy;
use reqwest::StatusCode;

use super::chunk::ByteRange;
use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::error::{ManagerError, ManagerResult};

/// Buffer size for streaming response bodies (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// What a HEAD request revealed about a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw `location` header.
    pub location: Option<String>,
    /// Parsed `content-length` header.
    pub content_length: Option<u64>,
    /// `accept-ranges` advertised byte ranges.
    pub accept_ranges: bool,
    /// Raw `content-disposition` header.
    pub content_disposition: Option<String>,
    /// Raw `content-type` header.
    pub content_type: Option<String>,
}

impl ProbeResponse {
    /// A 3xx response that names where to go next.
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.location.is_some()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The server refuses HEAD (`405 Method Not Allowed` or
    /// `501 Not Implemented`) but may still serve GET.
    pub fn head_unsupported(&self) -> bool {
        matches!(self.status, 405 | 501)
    }

    /// The resource is an HTML page rather than a file.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|t| t.trim_start().to_ascii_lowercase().starts_with("text/html"))
            .unwrap_or(false)
    }
}

/// Network operations needed to fetch a package.
///
/// Implementations must be shareable across the worker threads of a chunked
/// download.
pub trait Transport: Send + Sync {
    /// Issue a HEAD request without following redirects.
    fn probe(&self, url: &str) -> ManagerResult<ProbeResponse>;

    /// Fetch one byte range.
    ///
    /// Succeeds only for a `206 Partial Content` response and returns its
    /// body. Callers verify the body length.
    fn fetch_range(&self, url: &str, range: &ByteRange) -> ManagerResult<Vec<u8>>;

    /// Stream the whole resource into `sink`, returning the bytes written.
    fn fetch_to(&self, url: &str, sink: &mut dyn Write) -> ManagerResult<u64>;
}

/// Blocking `reqwest` transport.
///
/// Redirects are never followed automatically; the fetcher follows at most
/// one hop itself so it can record the resolved URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    pub(crate) timeout: Duration,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> ManagerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| ManagerError::HttpError(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Create a transport with the default five minute timeout.
    pub fn with_default_timeout() -> ManagerResult<Self> {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> ManagerError {
        if e.is_timeout() {
            ManagerError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            ManagerError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }

    fn send_get(&self, url: &str, range: Option<&ByteRange>) -> ManagerResult<Response> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }
        request.send().map_err(|e| self.request_error(url, e))
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

impl Transport for HttpTransport {
    fn probe(&self, url: &str) -> ManagerResult<ProbeResponse> {
        let response = self
            .client
            .head(url)
            .send()
            .map_err(|e| self.request_error(url, e))?;

        let headers = response.headers();
        let probe = ProbeResponse {
            status: response.status().as_u16(),
            location: header_str(headers, LOCATION),
            content_length: header_str(headers, CONTENT_LENGTH).and_then(|s| s.parse().ok()),
            accept_ranges: header_str(headers, ACCEPT_RANGES)
                .map(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
                .unwrap_or(false),
            content_disposition: header_str(headers, CONTENT_DISPOSITION),
            content_type: header_str(headers, CONTENT_TYPE),
        };

        tracing::trace!(url, status = probe.status, length = ?probe.content_length, ranges = probe.accept_ranges, "probed");
        Ok(probe)
    }

    fn fetch_range(&self, url: &str, range: &ByteRange) -> ManagerResult<Vec<u8>> {
        let response = self.send_get(url, Some(range))?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(ManagerError::DownloadFailed {
                url: url.to_string(),
                reason: format!(
                    "range {} answered with {} instead of 206 Partial Content",
                    range,
                    response.status()
                ),
            });
        }

        response
            .bytes()
            .map(|body| body.to_vec())
            .map_err(|e| self.request_error(url, e))
    }

    fn fetch_to(&self, url: &str, sink: &mut dyn Write) -> ManagerResult<u64> {
        let mut response = self.send_get(url, None)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::DownloadFailed {
                url: url.to_string(),
                reason: format!("GET request failed with status {}", status),
            });
        }

        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut downloaded = 0u64;

        loop {
            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| ManagerError::DownloadFailed {
                    url: url.to_string(),
                    reason: format!("read error: {}", e),
                })?;

            if bytes_read == 0 {
                break;
            }

            sink.write_all(&buffer[..bytes_read])
                .map_err(|e| ManagerError::DownloadFailed {
                    url: url.to_string(),
                    reason: format!("write error: {}", e),
                })?;

            downloaded += bytes_read as u64;
        }

        Ok(downloaded)
    }
}
