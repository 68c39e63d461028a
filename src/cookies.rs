//! Cookie header codec and the client-scoped cookie jar.
//!
//! Serializes a cookie map into a `Cookie` header value and parses
//! `Set-Cookie` header values back into a map, dropping the attribute
//! fields (`domain`, `path`, `expires`, `secure`, `httponly`). The
//! [`CookieJar`] accumulates parsed cookies across every request made
//! through one client when the jar is enabled.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// `Set-Cookie` attribute names that are not cookies themselves.
///
/// Matched case-insensitively by exact name: a cookie literally named
/// `Path` is an attribute, a cookie named `pathfinder` is not.
const ATTRIBUTE_NAMES: &[&str] = &["domain", "path", "expires", "secure", "httponly"];

/// Serializes a cookie map into a `Cookie` header value (`k=v; k2=v2`).
#[must_use]
pub fn serialize_cookies(cookies: &BTreeMap<String, String>) -> String {
    let mut header = String::new();
    for (name, value) in cookies {
        if !header.is_empty() {
            header.push_str("; ");
        }
        header.push_str(name);
        header.push('=');
        header.push_str(value);
    }
    header
}

/// Parses one `Set-Cookie` header value into a cookie map.
///
/// Attribute fields are filtered out; a valueless pair (`flag`) parses to an
/// empty value. Malformed fragments are skipped rather than failing the
/// response.
#[must_use]
pub fn parse_set_cookie(value: &str) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();

    for part in value.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (name, value) = match part.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (part, ""),
        };

        if name.is_empty() || is_attribute(name) {
            continue;
        }

        cookies.insert(name.to_string(), value.to_string());
    }

    cookies
}

/// Returns true when the name is a `Set-Cookie` attribute, not a cookie.
fn is_attribute(name: &str) -> bool {
    ATTRIBUTE_NAMES
        .iter()
        .any(|attribute| name.eq_ignore_ascii_case(attribute))
}

/// Client-scoped cookie store shared by every request on one client.
///
/// All mutation happens under the internal lock; lock scopes never span an
/// await point, so the jar is safe to share across concurrent requests.
#[derive(Debug, Default)]
pub struct CookieJar {
    inner: Mutex<BTreeMap<String, String>>,
}

impl CookieJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar seeded with the given cookies.
    #[must_use]
    pub fn with_cookies(cookies: BTreeMap<String, String>) -> Self {
        Self {
            inner: Mutex::new(cookies),
        }
    }

    /// Merges the given cookies into the jar, overwriting same-named entries.
    pub fn merge(&self, cookies: &BTreeMap<String, String>) {
        if cookies.is_empty() {
            return;
        }
        let mut jar = self.lock();
        for (name, value) in cookies {
            jar.insert(name.clone(), value.clone());
        }
        debug!(merged = cookies.len(), total = jar.len(), "cookie jar updated");
    }

    /// Returns a copy of the jar's current content.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock().clone()
    }

    /// Returns the value of one cookie, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    /// Returns true when the jar holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
