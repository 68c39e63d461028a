//! Client configuration, per-request options, and the typed option merge.
//!
//! Configuration is split in two layers: [`ClientConfig`] holds session-wide
//! defaults and is immutable for the life of a [`Requester`](crate::Requester)
//! (except for the proxy list, which has explicit add/remove operations), and
//! [`RequestOptions`] carries per-call intent. The two are combined once per
//! top-level call by [`EffectiveOptions::merge`], which is the single place
//! where precedence between the layers is decided.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::response::Body;

/// Default per-attempt timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of followed redirects.
pub const DEFAULT_FOLLOW_MAX: u32 = 5;

/// Basic-auth credentials for request or proxy authentication.
///
/// The password is intentionally redacted in Debug output to prevent
/// accidental logging of secrets.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name sent in the Basic auth header.
    pub username: String,
    /// Password (sensitive — never log).
    password: String,
}

impl Credentials {
    /// Creates a new credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the password.
    ///
    /// Passwords are sensitive — avoid logging the return value.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Renders the `Basic` authorization header value for this pair.
    #[must_use]
    pub fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", BASE64.encode(raw))
    }
}

// Custom Debug impl that redacts the password.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// One entry in the client's proxy rotation.
///
/// Proxies are selected round-robin, once per top-level call; the selected
/// proxy stays fixed for every retry and redirect of that call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyServer {
    /// Proxy host name or IP address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// Credentials sent as `Proxy-Authorization` when present.
    pub auth: Option<Credentials>,
}

impl ProxyServer {
    /// Creates a proxy entry without credentials.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
        }
    }

    /// Creates a proxy entry with Basic credentials.
    #[must_use]
    pub fn with_auth(host: impl Into<String>, port: u16, auth: Credentials) -> Self {
        Self {
            host: host.into(),
            port,
            auth: Some(auth),
        }
    }
}

impl fmt::Display for ProxyServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Forced text encoding for response bodies.
///
/// When set, gzip inflation is skipped and the body bytes are decoded
/// directly with the chosen encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    /// Lossy UTF-8 decoding (the default when nothing is forced).
    Utf8,
    /// Byte-per-character decoding, for callers that want raw bytes as text.
    Binary,
}

/// Structured format expected of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFormat {
    /// Parse the body as JSON into a [`serde_json::Value`].
    Json,
    /// Parse the body as XML into an [`xmltree::Element`].
    Xml,
}

/// Value of one request data field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A plain text value.
    Text(String),
    /// A file reference; multipart requests send the file's bytes as the
    /// field content.
    File(PathBuf),
}

/// One named field of the request data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: FieldValue,
}

impl Field {
    /// Returns the value rendered as text.
    ///
    /// File references render as their path; only multipart encoding reads
    /// the file content.
    #[must_use]
    pub fn value_text(&self) -> String {
        match &self.value {
            FieldValue::Text(text) => text.clone(),
            FieldValue::File(path) => path.display().to_string(),
        }
    }
}

/// Ordered request data: the fields of a form, query string, or multipart
/// body. Field order is preserved through every encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Data {
    fields: Vec<Field>,
}

impl Data {
    /// Creates an empty data set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
        });
        self
    }

    /// Appends a file-reference field (multipart requests send the file's
    /// bytes as the field content).
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: FieldValue::File(path.into()),
        });
        self
    }

    /// Returns the fields in insertion order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns true when no fields are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Data {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = Self::new();
        for (name, value) in iter {
            data = data.text(name, value);
        }
        data
    }
}

/// Caller-supplied predicate that inspects a decoded body and reports
/// whether the request should be treated as failed (forcing a retry).
pub type FailurePredicate = Arc<dyn Fn(&Body) -> bool + Send + Sync>;

/// Caller-supplied transform that signs/encodes the request data into the
/// body string for body-bearing methods, replacing form encoding.
pub type RequestSigner = Arc<dyn Fn(&Data) -> String + Send + Sync>;

/// Caller-supplied transform applied to the decoded body text before the
/// JSON/XML parse step.
pub type ResponseProcessor = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Session-wide defaults, set once when constructing a
/// [`Requester`](crate::Requester).
#[derive(Clone)]
pub struct ClientConfig {
    /// Default headers sent with every request.
    pub headers: HeaderMap,
    /// Default cookies; also the initial content of the cookie jar when
    /// `cookie_jar` is enabled.
    pub cookies: BTreeMap<String, String>,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retry budget: the number of re-attempts after the first failure.
    pub retries: u32,
    /// Forced response text encoding (disables gzip inflation when set).
    pub encoding: Option<Encoding>,
    /// Ordered proxy rotation.
    pub proxies: Vec<ProxyServer>,
    /// Whether 3xx responses with a `Location` header are followed.
    pub follow: bool,
    /// Maximum number of followed redirects per top-level call.
    pub follow_max: u32,
    /// Default Basic-auth credentials.
    pub auth: Option<Credentials>,
    /// Default structured format expected of response bodies.
    pub data_format: Option<DataFormat>,
    /// When true, `Set-Cookie` values accumulate in a shared jar across all
    /// requests made through the same client.
    pub cookie_jar: bool,
    /// Default failure predicate.
    pub did_request_fail: Option<FailurePredicate>,
    /// Default request signer.
    pub sign_request: Option<RequestSigner>,
    /// Default response post-processor.
    pub process_response: Option<ResponseProcessor>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
            encoding: None,
            proxies: Vec::new(),
            follow: true,
            follow_max: DEFAULT_FOLLOW_MAX,
            auth: None,
            data_format: None,
            cookie_jar: false,
            did_request_fail: None,
            sign_request: None,
            process_response: None,
        }
    }
}

// Custom Debug impl: hooks have no useful Debug representation.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("encoding", &self.encoding)
            .field("proxies", &self.proxies)
            .field("follow", &self.follow)
            .field("follow_max", &self.follow_max)
            .field("auth", &self.auth)
            .field("data_format", &self.data_format)
            .field("cookie_jar", &self.cookie_jar)
            .field("did_request_fail", &self.did_request_fail.is_some())
            .field("sign_request", &self.sign_request.is_some())
            .field("process_response", &self.process_response.is_some())
            .finish()
    }
}

/// Per-call options. Every field is optional; unset fields inherit the
/// client default (see [`EffectiveOptions::merge`] for the precedence table).
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Request data: query string for GET/DELETE, body for POST/PUT,
    /// fields for multipart.
    pub data: Option<Data>,
    /// Extra headers, overriding same-named client headers.
    pub headers: HeaderMap,
    /// Extra cookies, overriding same-named client cookies.
    pub cookies: BTreeMap<String, String>,
    /// Basic-auth credentials for this call.
    pub auth: Option<Credentials>,
    /// Per-attempt timeout for this call.
    pub timeout: Option<Duration>,
    /// Retry budget for this call.
    pub retries: Option<u32>,
    /// Forced response text encoding for this call.
    pub encoding: Option<Encoding>,
    /// Structured format expected of the response body.
    pub data_format: Option<DataFormat>,
    /// Whether redirects are followed for this call.
    pub follow: Option<bool>,
    /// Redirect cap for this call.
    pub follow_max: Option<u32>,
    /// Explicit proxy, bypassing the client's rotation.
    pub proxy: Option<ProxyServer>,
    /// Encode the data as a `multipart/form-data` body.
    pub multipart: bool,
    /// Failure predicate for this call.
    pub did_request_fail: Option<FailurePredicate>,
    /// Request signer for this call.
    pub sign_request: Option<RequestSigner>,
    /// Response post-processor for this call.
    pub process_response: Option<ResponseProcessor>,
}

impl RequestOptions {
    /// Shorthand for options that only carry request data.
    #[must_use]
    pub fn with_data(data: Data) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }
}

// Custom Debug impl: hooks have no useful Debug representation.
impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("data", &self.data)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("auth", &self.auth)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("encoding", &self.encoding)
            .field("data_format", &self.data_format)
            .field("follow", &self.follow)
            .field("follow_max", &self.follow_max)
            .field("proxy", &self.proxy)
            .field("multipart", &self.multipart)
            .field("did_request_fail", &self.did_request_fail.is_some())
            .field("sign_request", &self.sign_request.is_some())
            .field("process_response", &self.process_response.is_some())
            .finish()
    }
}

/// Fully-resolved options for one top-level call: [`RequestOptions`] merged
/// over [`ClientConfig`], owned exclusively by one orchestrator.
#[derive(Clone)]
pub(crate) struct EffectiveOptions {
    pub(crate) method: Method,
    pub(crate) headers: HeaderMap,
    pub(crate) cookies: BTreeMap<String, String>,
    pub(crate) timeout: Duration,
    pub(crate) retries: u32,
    pub(crate) encoding: Option<Encoding>,
    pub(crate) data_format: Option<DataFormat>,
    pub(crate) follow: bool,
    pub(crate) follow_max: u32,
    pub(crate) auth: Option<Credentials>,
    pub(crate) proxy: Option<ProxyServer>,
    pub(crate) multipart: bool,
    pub(crate) data: Option<Data>,
    pub(crate) did_request_fail: Option<FailurePredicate>,
    pub(crate) sign_request: Option<RequestSigner>,
    pub(crate) process_response: Option<ResponseProcessor>,
}

impl EffectiveOptions {
    /// Merges per-call options over client defaults.
    ///
    /// Precedence, field by field:
    ///
    /// | Field | Rule |
    /// |-------|------|
    /// | `headers` | map merge: client headers first, request headers override same names |
    /// | `cookies` | map merge: client cookies first, request cookies override same names |
    /// | `timeout`, `retries`, `encoding`, `data_format`, `follow`, `follow_max`, `auth` | request value when set, else client default |
    /// | hooks (`did_request_fail`, `sign_request`, `process_response`) | request hook when set, else client hook |
    /// | `data`, `multipart` | request-only |
    /// | `proxy` | resolved by the caller: explicit request proxy, else round-robin over the client list |
    pub(crate) fn merge(
        config: &ClientConfig,
        request: RequestOptions,
        method: Method,
        proxy: Option<ProxyServer>,
    ) -> Self {
        let mut headers = config.headers.clone();
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }

        let mut cookies = config.cookies.clone();
        cookies.extend(request.cookies);

        Self {
            method,
            headers,
            cookies,
            timeout: request.timeout.unwrap_or(config.timeout),
            retries: request.retries.unwrap_or(config.retries),
            encoding: request.encoding.or(config.encoding),
            data_format: request.data_format.or(config.data_format),
            follow: request.follow.unwrap_or(config.follow),
            follow_max: request.follow_max.unwrap_or(config.follow_max),
            auth: request.auth.or_else(|| config.auth.clone()),
            proxy,
            multipart: request.multipart,
            data: request.data,
            did_request_fail: request
                .did_request_fail
                .or_else(|| config.did_request_fail.clone()),
            sign_request: request.sign_request.or_else(|| config.sign_request.clone()),
            process_response: request
                .process_response
                .or_else(|| config.process_response.clone()),
        }
    }
}
