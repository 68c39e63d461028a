//! One-round-trip transport seam.
//!
//! The orchestrator consumes networking exclusively through the
//! [`Transport`] trait: one call performs exactly one network round trip and
//! yields either a complete [`RawResponse`] or a [`TransportError`]. The
//! production implementation, [`HttpTransport`], is a thin wrapper over
//! reqwest with redirect following and automatic decompression disabled —
//! both are the engine's own responsibility.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::ProxyServer;

/// Fully-resolved parameters for one transport attempt.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Target URL, query string included.
    pub url: Url,
    /// Finalized header set.
    pub headers: HeaderMap,
    /// Request body, when the method carries one.
    pub body: Option<Bytes>,
    /// Attempt timeout; expiry tears the connection down.
    pub timeout: Duration,
    /// Proxy to route through, when one is selected.
    pub proxy: Option<ProxyServer>,
}

/// Result of one successful transport attempt.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Complete response body bytes, exactly as received.
    pub body: Bytes,
}

impl RawResponse {
    /// Returns a response header as text, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns true for 3xx statuses.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Errors from one transport attempt.
///
/// Every variant is retryable: the orchestrator re-attempts with identical
/// parameters until the retry budget is exhausted.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The attempt did not complete within the configured timeout.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Connection-level failure (DNS, refused, reset, TLS).
    #[error("connection failure requesting {url}: {source}")]
    Connect {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The proxy route could not be established.
    #[error("proxy {proxy} could not be used: {source}")]
    Proxy {
        /// The proxy that failed.
        proxy: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Creates a timeout error.
    pub(crate) fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a connection error from a reqwest error.
    pub(crate) fn connect(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Connect {
            url: url.into(),
            source,
        }
    }
}

/// Capability that performs exactly one network round trip.
///
/// Implemented by [`HttpTransport`] in production; tests inject scripted
/// implementations to exercise the orchestrator without sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one round trip and yields the complete response or a
    /// transport failure. The connection is released on every exit path.
    async fn round_trip(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed [`Transport`].
///
/// Redirects and content decompression are disabled on the underlying
/// client: the orchestrator follows redirects itself and the decoder owns
/// gzip inflation.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Creates the transport with a direct (unproxied) client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = base_builder()
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Resolves the client for one attempt: the shared direct client, or a
    /// client routed through the attempt's proxy.
    fn client_for(&self, proxy: Option<&ProxyServer>) -> Result<Client, TransportError> {
        match proxy {
            None => Ok(self.client.clone()),
            Some(proxy) => proxied_client(proxy),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn round_trip(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let url = request.url.to_string();
        let client = self.client_for(request.proxy.as_ref())?;

        debug!(
            method = %request.method,
            url = %url,
            proxy = request.proxy.as_ref().map(ToString::to_string),
            timeout_ms = request.timeout.as_millis(),
            "transport attempt"
        );

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .timeout(request.timeout)
            .headers(request.headers.clone());
        if let Some(body) = request.body.clone() {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_send_error(&url, e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = collect_body(response, &url).await?;

        debug!(status, body_bytes = body.len(), "transport attempt complete");

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// Accumulates the streamed response body; mid-body failures are transport
/// failures like any other.
async fn collect_body(response: reqwest::Response, url: &str) -> Result<Bytes, TransportError> {
    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| classify_send_error(url, e))?;
        buffer.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(buffer))
}

fn classify_send_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(url)
    } else {
        TransportError::connect(url, error)
    }
}

fn base_builder() -> reqwest::ClientBuilder {
    Client::builder().redirect(Policy::none())
}

/// Builds a client routed through the given proxy.
fn proxied_client(proxy: &ProxyServer) -> Result<Client, TransportError> {
    let target = format!("http://{proxy}");
    let resolved = reqwest::Proxy::all(&target).map_err(|e| {
        warn!(proxy = %target, error = %e, "invalid proxy target");
        TransportError::Proxy {
            proxy: target.clone(),
            source: e,
        }
    })?;
    base_builder()
        .proxy(resolved)
        .build()
        .map_err(|e| TransportError::Proxy {
            proxy: target,
            source: e,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_round_trip_returns_status_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-marker", "present")
                    .set_body_string("hello"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new();
        let response = transport
            .round_trip(TransportRequest {
                method: Method::GET,
                url: Url::parse(&format!("{}/ok", server.uri())).unwrap(),
                headers: HeaderMap::new(),
                body: None,
                timeout: Duration::from_secs(5),
                proxy: None,
            })
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header("x-marker"), Some("present"));
        assert_eq!(&response.body[..], b"hello");
    }

    #[tokio::test]
    async fn test_round_trip_sends_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("x-token", "t1"))
            .and(body_string("x=y"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-token", "t1".parse().unwrap());

        let transport = HttpTransport::new();
        let response = transport
            .round_trip(TransportRequest {
                method: Method::POST,
                url: Url::parse(&format!("{}/submit", server.uri())).unwrap(),
                headers,
                body: Some(Bytes::from_static(b"x=y")),
                timeout: Duration::from_secs(5),
                proxy: None,
            })
            .await
            .unwrap();

        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn test_round_trip_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/elsewhere"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new();
        let response = transport
            .round_trip(TransportRequest {
                method: Method::GET,
                url: Url::parse(&format!("{}/moved", server.uri())).unwrap(),
                headers: HeaderMap::new(),
                body: None,
                timeout: Duration::from_secs(5),
                proxy: None,
            })
            .await
            .unwrap();

        assert!(response.is_redirect());
        assert_eq!(response.header("location"), Some("/elsewhere"));
    }

    #[tokio::test]
    async fn test_round_trip_timeout_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new();
        let result = transport
            .round_trip(TransportRequest {
                method: Method::GET,
                url: Url::parse(&format!("{}/slow", server.uri())).unwrap(),
                headers: HeaderMap::new(),
                body: None,
                timeout: Duration::from_millis(100),
                proxy: None,
            })
            .await;

        assert!(matches!(result, Err(TransportError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_round_trip_connection_refused_classified() {
        // Port 1 is essentially never listening.
        let transport = HttpTransport::new();
        let result = transport
            .round_trip(TransportRequest {
                method: Method::GET,
                url: Url::parse("http://127.0.0.1:1/unreachable").unwrap(),
                headers: HeaderMap::new(),
                body: None,
                timeout: Duration::from_secs(2),
                proxy: None,
            })
            .await;

        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_gzip_body_is_delivered_raw() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"compressed payload").unwrap();
        let gzipped = encoder.finish().unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gz"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-encoding", "gzip")
                    .set_body_bytes(gzipped.clone()),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new();
        let response = transport
            .round_trip(TransportRequest {
                method: Method::GET,
                url: Url::parse(&format!("{}/gz", server.uri())).unwrap(),
                headers: HeaderMap::new(),
                body: None,
                timeout: Duration::from_secs(5),
                proxy: None,
            })
            .await
            .unwrap();

        // The transport must not inflate: decoding is the decoder's job.
        assert_eq!(&response.body[..], &gzipped[..]);
        assert_eq!(response.header("content-encoding"), Some("gzip"));
    }
}
