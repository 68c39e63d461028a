//! The client handle: verb entry points, proxy rotation, and the shared
//! cookie jar.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Method;
use tracing::{debug, instrument};
use url::Url;

use crate::config::{ClientConfig, EffectiveOptions, ProxyServer, RequestOptions};
use crate::cookies::CookieJar;
use crate::request::RequestError;
use crate::request::orchestrator::Orchestrator;
use crate::response::Response;
use crate::transport::{HttpTransport, Transport};

/// An HTTP client: session defaults plus the per-call pipeline.
///
/// Construct once with a [`ClientConfig`] and reuse for every request; the
/// handle is cheap to share behind an `Arc` and all its methods take
/// `&self`. Each verb call runs the full pipeline — option merge, proxy
/// rotation, payload encoding, bounded retry, redirect following, body
/// decoding — and resolves exactly once.
///
/// # Example
///
/// ```no_run
/// use requester::{ClientConfig, Data, Requester, RequestOptions};
///
/// # async fn example() -> Result<(), requester::RequestError> {
/// let client = Requester::new(ClientConfig::default());
/// let response = client
///     .post(
///         "http://localhost:1338/submit",
///         RequestOptions::with_data(Data::new().text("something", "something")),
///     )
///     .await?;
/// assert!(response.is_success());
/// # Ok(())
/// # }
/// ```
pub struct Requester {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    /// Proxy rotation; mutated only through add/remove operations.
    proxies: Mutex<Vec<ProxyServer>>,
    /// Top-level call counter driving round-robin proxy selection.
    sequence: AtomicU64,
    /// Accumulating cookie store, present when the config enables it.
    jar: Option<Arc<CookieJar>>,
}

impl Requester {
    /// Creates a client over the default reqwest-backed transport.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// Creates a client over a caller-supplied transport.
    ///
    /// The seam exists for tests and for embedders that bring their own
    /// connection layer.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let jar = config
            .cookie_jar
            .then(|| Arc::new(CookieJar::with_cookies(config.cookies.clone())));
        let proxies = Mutex::new(config.proxies.clone());
        Self {
            config,
            transport,
            proxies,
            sequence: AtomicU64::new(0),
            jar,
        }
    }

    /// Issues a GET request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the URL is invalid or every attempt
    /// within the retry budget failed.
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.execute(Method::GET, url, options).await
    }

    /// Issues a POST request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the URL is invalid or every attempt
    /// within the retry budget failed.
    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.execute(Method::POST, url, options).await
    }

    /// Issues a PUT request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the URL is invalid or every attempt
    /// within the retry budget failed.
    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.execute(Method::PUT, url, options).await
    }

    /// Issues a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the URL is invalid or every attempt
    /// within the retry budget failed.
    pub async fn delete(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, RequestError> {
        self.execute(Method::DELETE, url, options).await
    }

    /// Issues a `multipart/form-data` POST: shorthand for [`post`](Self::post)
    /// with the multipart flag set.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the URL is invalid, a file field could
    /// not be read, or every attempt within the retry budget failed.
    pub async fn multipart(
        &self,
        url: &str,
        mut options: RequestOptions,
    ) -> Result<Response, RequestError> {
        options.multipart = true;
        self.execute(Method::POST, url, options).await
    }

    /// Adds proxies to the rotation, skipping entries already present
    /// (value equality).
    pub fn add_proxies(&self, proxies: impl IntoIterator<Item = ProxyServer>) {
        let mut list = self.lock_proxies();
        for proxy in proxies {
            if !list.contains(&proxy) {
                debug!(proxy = %proxy, "adding proxy to rotation");
                list.push(proxy);
            }
        }
    }

    /// Removes proxies from the rotation by value equality.
    pub fn remove_proxies(&self, proxies: impl IntoIterator<Item = ProxyServer>) {
        let remove: Vec<ProxyServer> = proxies.into_iter().collect();
        let mut list = self.lock_proxies();
        list.retain(|proxy| !remove.contains(proxy));
    }

    /// Returns a copy of the current proxy rotation.
    #[must_use]
    pub fn proxies(&self) -> Vec<ProxyServer> {
        self.lock_proxies().clone()
    }

    /// Returns the client's cookie jar, when the config enabled one.
    #[must_use]
    pub fn cookie_jar(&self) -> Option<&Arc<CookieJar>> {
        self.jar.as_ref()
    }

    /// The shared pipeline behind every verb.
    #[instrument(skip(self, options), fields(method = %method, url = url))]
    async fn execute(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, RequestError> {
        let url = Url::parse(url).map_err(|_| RequestError::invalid_url(url))?;

        // The sequence number advances once per top-level call, retries
        // included, so rotation order is stable under concurrency.
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let proxy = match options.proxy.clone() {
            Some(explicit) => Some(explicit),
            None => self.rotate_proxy(sequence),
        };

        // Request-level cookies join the jar for this and later requests.
        if let Some(jar) = &self.jar {
            jar.merge(&options.cookies);
        }

        let effective = EffectiveOptions::merge(&self.config, options, method, proxy);
        Orchestrator::new(
            Arc::clone(&self.transport),
            effective,
            self.jar.clone(),
            url,
        )
        .run()
        .await
    }

    /// Round-robin proxy selection for one top-level call.
    fn rotate_proxy(&self, sequence: u64) -> Option<ProxyServer> {
        let list = self.lock_proxies();
        if list.is_empty() {
            return None;
        }
        let index = usize::try_from(sequence % list.len() as u64).unwrap_or(0);
        Some(list[index].clone())
    }

    fn lock_proxies(&self) -> std::sync::MutexGuard<'_, Vec<ProxyServer>> {
        self.proxies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::header::HeaderMap;

    use crate::transport::{RawResponse, TransportError, TransportRequest};

    /// Transport that answers 200 to everything and records the requests.
    #[derive(Default)]
    struct RecordingTransport {
        seen: StdMutex<Vec<TransportRequest>>,
    }

    impl RecordingTransport {
        fn requests(&self) -> Vec<TransportRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn round_trip(
            &self,
            request: TransportRequest,
        ) -> Result<RawResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            Ok(RawResponse {
                status: 200,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            })
        }
    }

    fn client_with_proxies(proxies: Vec<ProxyServer>) -> (Requester, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let client = Requester::with_transport(
            ClientConfig {
                proxies,
                ..ClientConfig::default()
            },
            Arc::clone(&transport) as Arc<dyn Transport>,
        );
        (client, transport)
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_attempt() {
        let (client, transport) = client_with_proxies(Vec::new());
        let error = client
            .get("not a url", RequestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(error, RequestError::InvalidUrl { .. }));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_proxy_round_robin_across_calls() {
        let (client, transport) = client_with_proxies(vec![
            ProxyServer::new("p1", 80),
            ProxyServer::new("p2", 80),
        ]);

        for _ in 0..4 {
            client
                .get("http://host/", RequestOptions::default())
                .await
                .unwrap();
        }

        let hosts: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| r.proxy.as_ref().unwrap().host.clone())
            .collect();
        assert_eq!(hosts, vec!["p1", "p2", "p1", "p2"]);
    }

    #[tokio::test]
    async fn test_explicit_request_proxy_bypasses_rotation() {
        let (client, transport) = client_with_proxies(vec![ProxyServer::new("rotated", 80)]);

        client
            .get(
                "http://host/",
                RequestOptions {
                    proxy: Some(ProxyServer::new("explicit", 3128)),
                    ..RequestOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            transport.requests()[0].proxy.as_ref().unwrap().host,
            "explicit"
        );
    }

    #[tokio::test]
    async fn test_no_proxies_means_direct() {
        let (client, transport) = client_with_proxies(Vec::new());
        client
            .get("http://host/", RequestOptions::default())
            .await
            .unwrap();
        assert!(transport.requests()[0].proxy.is_none());
    }

    #[test]
    fn test_add_proxies_skips_duplicates() {
        let (client, _) = client_with_proxies(vec![ProxyServer::new("p1", 80)]);

        client.add_proxies([ProxyServer::new("p1", 80), ProxyServer::new("p2", 80)]);

        assert_eq!(client.proxies().len(), 2);
    }

    #[test]
    fn test_remove_proxies_by_value_equality() {
        let (client, _) = client_with_proxies(vec![
            ProxyServer::new("p1", 80),
            ProxyServer::new("p2", 80),
        ]);

        client.remove_proxies([ProxyServer::new("p1", 80)]);

        let remaining = client.proxies();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].host, "p2");
    }

    #[tokio::test]
    async fn test_multipart_sets_flag_and_posts() {
        let (client, transport) = client_with_proxies(Vec::new());
        let file = {
            use std::io::Write;
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(b"payload").unwrap();
            file
        };

        client
            .multipart(
                "http://host/upload",
                RequestOptions::with_data(
                    crate::config::Data::new()
                        .text("kind", "doc")
                        .file("doc", file.path()),
                ),
            )
            .await
            .unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::POST);
        let content_type = request
            .headers
            .get(reqwest::header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let body = String::from_utf8_lossy(request.body.as_ref().unwrap()).into_owned();
        assert!(body.contains("name=\"kind\""));
        assert!(body.contains("payload"));
    }

    #[tokio::test]
    async fn test_jar_disabled_by_default() {
        let (client, _) = client_with_proxies(Vec::new());
        assert!(client.cookie_jar().is_none());
    }

    #[tokio::test]
    async fn test_jar_seeded_with_client_cookies_and_fed_by_requests() {
        let transport = Arc::new(RecordingTransport::default());
        let client = Requester::with_transport(
            ClientConfig {
                cookie_jar: true,
                cookies: std::collections::BTreeMap::from([(
                    "seed".to_string(),
                    "1".to_string(),
                )]),
                ..ClientConfig::default()
            },
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let jar = client.cookie_jar().unwrap();
        assert_eq!(jar.get("seed").as_deref(), Some("1"));

        client
            .get(
                "http://host/",
                RequestOptions {
                    cookies: std::collections::BTreeMap::from([(
                        "per-request".to_string(),
                        "2".to_string(),
                    )]),
                    ..RequestOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(jar.get("per-request").as_deref(), Some("2"));
    }
}
