//! The delivered response record and its decoded body value.

use std::collections::BTreeMap;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use url::Url;

use crate::config::ProxyServer;

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Plain (or post-processed) body text.
    Text(String),
    /// Body parsed as JSON.
    Json(serde_json::Value),
    /// Body parsed as an XML document.
    Xml(xmltree::Element),
}

impl Body {
    /// Returns the text body, if this is a text payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the parsed JSON value, if this is a JSON payload.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the parsed XML root element, if this is an XML payload.
    #[must_use]
    pub fn as_xml(&self) -> Option<&xmltree::Element> {
        match self {
            Self::Xml(element) => Some(element),
            _ => None,
        }
    }
}

/// The terminal result of one top-level call: the last transport response,
/// decoded, with everything the caller may want to inspect.
///
/// Constructed in one place by the orchestrator; nothing is attached after
/// construction.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code of the delivered response.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body bytes exactly as received (before inflation and parsing).
    pub raw_body: Bytes,
    /// Decoded body.
    pub body: Body,
    /// Cookies parsed from the response's `Set-Cookie` headers, attribute
    /// fields excluded.
    pub cookies: BTreeMap<String, String>,
    /// The URL actually fetched (after any followed redirects).
    pub url: Url,
    /// The proxy the request was routed through, when one was selected.
    pub proxy: Option<ProxyServer>,
}

impl Response {
    /// Returns a response header as text, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
