use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving the source feed.
///
/// Every variant names the URL so a failed scheduled run can be diagnosed
/// from its log alone.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// HTTP response with non-2xx status code
    #[error("HTTP error from {url}: status {status}")]
    HttpStatus { url: String, status: u16 },
    /// Request exceeded the configured timeout
    #[error("Request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
    /// Response body exceeded the 10MB size limit
    #[error("Response from {url} too large (limit {limit} bytes)")]
    ResponseTooLarge { url: String, limit: usize },
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response from {url}: expected {expected} bytes, received {received}")]
    IncompleteResponse {
        url: String,
        expected: u64,
        received: usize,
    },
}

/// Builds the HTTP client used for the source fetch.
pub fn build_client(config: &Config) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(FetchError::Client)
}

/// Retrieves the raw source feed with a single GET.
///
/// There is no retry: a failed attempt aborts the run and the previously
/// published feed stays in place until the next scheduled run.
///
/// # Arguments
///
/// * `client` - HTTP client (caller controls configuration)
/// * `url` - Source feed URL
/// * `timeout` - Bound for the whole request including the body
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - Request exceeded `timeout`
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - Response exceeded 10MB
/// - [`FetchError::IncompleteResponse`] - Body shorter than announced
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    tracing::info!(url = %url, "Fetching source feed");

    let bytes = tokio::time::timeout(timeout, fetch_inner(client, url))
        .await
        .map_err(|_| FetchError::Timeout {
            url: url.to_string(),
            secs: timeout.as_secs(),
        })??;

    tracing::debug!(url = %url, bytes = bytes.len(), "Fetched source feed");
    Ok(bytes)
}

async fn fetch_inner(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    if let Some(content_type) = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        if !content_type.contains("xml") && !content_type.starts_with("text/") {
            tracing::warn!(url = %url, content_type = %content_type, "Unexpected Content-Type for a feed");
        }
    }

    read_limited_bytes(response, url, MAX_FEED_SIZE).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge {
                url: url.to_string(),
                limit,
            });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge {
                url: url.to_string(),
                limit,
            });
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                url: url.to_string(),
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
