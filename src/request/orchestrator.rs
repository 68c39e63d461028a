//! The per-call state machine driving attempts, retries, redirects, and
//! decoding.
//!
//! # State
//!
//! One orchestrator exclusively owns the mutable state of one top-level
//! call: the attempt counter, the redirect counter, the current target URL,
//! and the prepared payload. The only cross-request shared state it touches
//! is the client's cookie jar, whose own lock serializes mutation.
//!
//! # Transitions
//!
//! Every transport outcome resolves to exactly one of:
//! - **retry** — transport, encoding, decode, or predicate failure with
//!   budget left; the next attempt reuses identical parameters;
//! - **redirect** — 3xx with a `Location` header while following is enabled
//!   and the redirect cap is not reached; the call re-targets the resolved
//!   URL with GET semantics and rebuilt headers;
//! - **deliver** — the decoded body passes the failure predicate;
//! - **fail** — the budget is exhausted; the last failure kind is returned.
//!
//! The attempt counter is incremented once per consumed attempt (a transport
//! try or a failed payload encode) and never exceeds `retries + 1`; the
//! redirect counter never exceeds `follow_max`.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue,
    PROXY_AUTHORIZATION, SET_COOKIE,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::RequestError;
use crate::config::EffectiveOptions;
use crate::cookies::{CookieJar, parse_set_cookie, serialize_cookies};
use crate::decode::{DecodeError, body_text, inflate, parse_body};
use crate::encode::{EncodingError, form, multipart};
use crate::response::{Body, Response};
use crate::transport::{RawResponse, Transport, TransportRequest};

/// Payload prepared for the current target: body bytes plus the headers the
/// encoding negotiated (content type, content length, multipart boundary).
///
/// Dropped and rebuilt when a redirect re-targets the call.
#[derive(Debug, Clone, Default)]
struct Payload {
    headers: HeaderMap,
    body: Option<Bytes>,
}

/// Drives one top-level call to its single terminal outcome.
pub(crate) struct Orchestrator {
    transport: Arc<dyn Transport>,
    options: EffectiveOptions,
    jar: Option<Arc<CookieJar>>,
    method: Method,
    url: Url,
    /// Attempts consumed (transport tries and failed encodes).
    attempts: u32,
    /// Redirects followed so far.
    follows: u32,
    payload: Option<Payload>,
}

impl Orchestrator {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        options: EffectiveOptions,
        jar: Option<Arc<CookieJar>>,
        url: Url,
    ) -> Self {
        let method = options.method.clone();
        Self {
            transport,
            options,
            jar,
            method,
            url,
            attempts: 0,
            follows: 0,
            payload: None,
        }
    }

    /// Runs the call to completion: exactly one `Ok(Response)` or
    /// `Err(RequestError)`, never a panic, never a silent termination.
    #[instrument(skip(self), fields(url = %self.url, method = %self.method))]
    pub(crate) async fn run(mut self) -> Result<Response, RequestError> {
        loop {
            // Encode the payload for the current target. Encoding failures
            // consume the shared attempt budget like transport failures.
            if self.payload.is_none() {
                match self.prepare_payload().await {
                    Ok(payload) => self.payload = Some(payload),
                    Err(source) => {
                        self.attempts += 1;
                        if self.budget_left() {
                            warn!(attempt = self.attempts, error = %source, "payload encoding failed; retrying");
                            continue;
                        }
                        return Err(RequestError::encoding(self.attempts, source));
                    }
                }
            }

            // One transport attempt.
            self.attempts += 1;
            let raw = match self.transport.round_trip(self.transport_request()).await {
                Ok(raw) => raw,
                Err(source) => {
                    if self.budget_left() {
                        warn!(attempt = self.attempts, error = %source, "transport attempt failed; retrying");
                        continue;
                    }
                    return Err(RequestError::transport(
                        self.url.as_str(),
                        self.attempts,
                        source,
                    ));
                }
            };

            // Cookies are parsed before the redirect decision so a redirect
            // response can still populate the jar.
            let cookies = self.collect_cookies(&raw);

            if let Some(next) = self.redirect_target(&raw) {
                debug!(
                    status = raw.status,
                    from = %self.url,
                    to = %next,
                    follows = self.follows + 1,
                    "following redirect"
                );
                self.follows += 1;
                self.url = next;
                // Redirects downgrade to GET: the payload and data are
                // dropped, headers are rebuilt for the new target.
                self.method = Method::GET;
                self.options.data = None;
                self.options.multipart = false;
                self.payload = None;
                continue;
            }

            let body = match self.decode(&raw) {
                Ok(body) => body,
                Err(source) => {
                    if self.budget_left() {
                        warn!(attempt = self.attempts, error = %source, "response decode failed; retrying");
                        continue;
                    }
                    return Err(RequestError::decode(
                        self.url.as_str(),
                        self.attempts,
                        source,
                    ));
                }
            };

            if let Some(predicate) = &self.options.did_request_fail {
                if predicate(&body) {
                    if self.budget_left() {
                        warn!(
                            attempt = self.attempts,
                            "response rejected by failure predicate; retrying"
                        );
                        continue;
                    }
                    return Err(RequestError::rejected(self.url.as_str(), self.attempts));
                }
            }

            info!(
                status = raw.status,
                attempts = self.attempts,
                follows = self.follows,
                url = %self.url,
                "request complete"
            );

            return Ok(Response {
                status: raw.status,
                headers: raw.headers,
                raw_body: raw.body,
                body,
                cookies,
                url: self.url.clone(),
                proxy: self.options.proxy.clone(),
            });
        }
    }

    /// True while the attempt budget allows another try.
    fn budget_left(&self) -> bool {
        self.attempts <= self.options.retries
    }

    /// Encodes the payload for the current target URL and method.
    async fn prepare_payload(&mut self) -> Result<Payload, EncodingError> {
        let Some(data) = self.options.data.clone() else {
            return Ok(Payload::default());
        };
        if data.is_empty() {
            return Ok(Payload::default());
        }

        let mut payload = Payload::default();

        if self.options.multipart {
            let encoded = multipart::assemble(&data).await?;
            if let Ok(value) = HeaderValue::from_str(&encoded.content_type) {
                payload.headers.insert(CONTENT_TYPE, value);
            }
            payload
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from(encoded.bytes.len() as u64));
            payload.body = Some(Bytes::from(encoded.bytes));
        } else if matches!(self.method, Method::POST | Method::PUT) {
            let body = if self.caller_content_type_is_json() {
                form::json_body(&data)?
            } else if let Some(signer) = &self.options.sign_request {
                signer(&data)
            } else {
                form::form_urlencode(&data)
            };

            if !self.options.headers.contains_key(CONTENT_TYPE) {
                payload.headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
            }
            payload
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
            payload.body = Some(Bytes::from(body));
        } else {
            // GET/DELETE: data rides in the query string. The payload is
            // cached afterwards, so the query is appended exactly once per
            // target even across retries.
            form::append_query(&mut self.url, &form::form_urlencode(&data));
        }

        Ok(payload)
    }

    fn caller_content_type_is_json(&self) -> bool {
        self.options
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| {
                value
                    .to_ascii_lowercase()
                    .starts_with("application/json")
            })
    }

    /// Builds the finalized header set for the next attempt: merged
    /// defaults, payload headers, the recomputed `Cookie` header, and auth.
    fn build_headers(&self) -> HeaderMap {
        let mut headers = self.options.headers.clone();

        if let Some(payload) = &self.payload {
            for (name, value) in &payload.headers {
                headers.insert(name.clone(), value.clone());
            }
        }

        // The computed Cookie header never clobbers one the caller set
        // explicitly.
        if !headers.contains_key(COOKIE) {
            let cookies = match &self.jar {
                Some(jar) => jar.snapshot(),
                None => self.options.cookies.clone(),
            };
            if !cookies.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&serialize_cookies(&cookies)) {
                    headers.insert(COOKIE, value);
                }
            }
        }

        if let Some(auth) = &self.options.auth {
            if let Ok(value) = HeaderValue::from_str(&auth.basic_header()) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        if let Some(proxy) = &self.options.proxy {
            if let Some(auth) = &proxy.auth {
                if let Ok(value) = HeaderValue::from_str(&auth.basic_header()) {
                    headers.insert(PROXY_AUTHORIZATION, value);
                }
            }
        }

        headers
    }

    fn transport_request(&self) -> TransportRequest {
        TransportRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.build_headers(),
            body: self.payload.as_ref().and_then(|payload| payload.body.clone()),
            timeout: self.options.timeout,
            proxy: self.options.proxy.clone(),
        }
    }

    /// Parses every `Set-Cookie` header and merges the result into the jar
    /// when one is enabled.
    fn collect_cookies(&self, raw: &RawResponse) -> BTreeMap<String, String> {
        let mut cookies = BTreeMap::new();
        for value in raw.headers.get_all(SET_COOKIE) {
            if let Ok(value) = value.to_str() {
                cookies.extend(parse_set_cookie(value));
            }
        }
        if let Some(jar) = &self.jar {
            jar.merge(&cookies);
        }
        cookies
    }

    /// Resolves the redirect target, when this response should be followed.
    fn redirect_target(&self, raw: &RawResponse) -> Option<Url> {
        if !self.options.follow || self.follows >= self.options.follow_max {
            return None;
        }
        if !raw.is_redirect() {
            return None;
        }
        let location = raw.header("location")?;
        match self.url.join(location) {
            Ok(next) => Some(next),
            Err(error) => {
                warn!(location, %error, "unresolvable redirect location; delivering response as-is");
                None
            }
        }
    }

    /// Decodes the response body: inflate, text-decode, post-process, parse.
    fn decode(&self, raw: &RawResponse) -> Result<Body, DecodeError> {
        let inflated = inflate(&raw.headers, &raw.body, self.options.encoding)?;
        let text = body_text(
            inflated.as_deref().unwrap_or_else(|| raw.body.as_ref()),
            self.options.encoding,
        );
        let text = match &self.options.process_response {
            Some(process) => process(text),
            None => text,
        };
        parse_body(text, self.options.data_format)
    }
}
