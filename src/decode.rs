//! Response body decoding: gzip inflation, text decoding, and JSON/XML
//! parsing into a [`Body`].
//!
//! Parse failures are deliberately non-fatal: truncated bodies are common on
//! flaky upstreams, so the orchestrator funnels a [`DecodeError`] into the
//! same bounded retry path as a transport failure.

use std::io::Read;

use flate2::read::MultiGzDecoder;
use reqwest::header::{CONTENT_ENCODING, HeaderMap};
use thiserror::Error;
use tracing::debug;

use crate::config::{DataFormat, Encoding};
use crate::response::Body;

/// Errors that can occur while decoding a response body.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The gzip-encoded body could not be inflated.
    #[error("failed to inflate gzip response body: {source}")]
    Gzip {
        /// The underlying inflation error.
        #[source]
        source: std::io::Error,
    },

    /// The body could not be parsed as JSON.
    #[error("failed to parse response body as JSON: {source}")]
    Json {
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The body could not be parsed as XML.
    #[error("failed to parse response body as XML: {source}")]
    Xml {
        /// The underlying parse error.
        #[source]
        source: xmltree::ParseError,
    },
}

/// Inflates the body when the response negotiated gzip and the caller did
/// not force an encoding. Returns `None` when no inflation applies.
pub(crate) fn inflate(
    headers: &HeaderMap,
    body: &[u8],
    forced: Option<Encoding>,
) -> Result<Option<Vec<u8>>, DecodeError> {
    if forced.is_some() || !is_gzip(headers) {
        return Ok(None);
    }

    let mut inflated = Vec::new();
    MultiGzDecoder::new(body)
        .read_to_end(&mut inflated)
        .map_err(|source| DecodeError::Gzip { source })?;

    debug!(
        compressed = body.len(),
        inflated = inflated.len(),
        "inflated gzip response body"
    );
    Ok(Some(inflated))
}

/// Decodes body bytes as text with the forced encoding, defaulting to lossy
/// UTF-8.
#[must_use]
pub(crate) fn body_text(bytes: &[u8], forced: Option<Encoding>) -> String {
    match forced {
        Some(Encoding::Binary) => bytes.iter().map(|&b| b as char).collect(),
        Some(Encoding::Utf8) | None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Parses the decoded text into the expected structured format.
pub(crate) fn parse_body(text: String, format: Option<DataFormat>) -> Result<Body, DecodeError> {
    match format {
        Some(DataFormat::Json) => {
            let value = serde_json::from_str(&text).map_err(|source| DecodeError::Json { source })?;
            Ok(Body::Json(value))
        }
        Some(DataFormat::Xml) => {
            let element = xmltree::Element::parse(text.as_bytes())
                .map_err(|source| DecodeError::Xml { source })?;
            Ok(Body::Xml(element))
        }
        None => Ok(Body::Text(text)),
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("gzip"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use reqwest::header::HeaderValue;
    use std::io::Write;

    fn gzip_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers
    }

    fn gzipped(payload: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_inflate_gzip_round_trip() {
        let inflated = inflate(&gzip_headers(), &gzipped(b"inflate me"), None)
            .unwrap()
            .unwrap();
        assert_eq!(inflated, b"inflate me");
    }

    #[test]
    fn test_inflate_skipped_without_gzip_header() {
        let result = inflate(&HeaderMap::new(), b"plain", None).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_inflate_skipped_when_encoding_forced() {
        let result = inflate(&gzip_headers(), &gzipped(b"x"), Some(Encoding::Binary)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_inflate_corrupt_gzip_is_decode_error() {
        let result = inflate(&gzip_headers(), b"definitely not gzip", None);
        assert!(matches!(result, Err(DecodeError::Gzip { .. })));
    }

    #[test]
    fn test_body_text_utf8_lossy_default() {
        assert_eq!(body_text(b"hello", None), "hello");
        // Invalid UTF-8 is replaced, not fatal.
        assert_eq!(body_text(&[0xff, 0xfe], None), "\u{fffd}\u{fffd}");
    }

    #[test]
    fn test_body_text_binary_is_byte_per_char() {
        assert_eq!(body_text(&[0x68, 0x69, 0xff], Some(Encoding::Binary)), "hi\u{ff}");
    }

    #[test]
    fn test_parse_body_json() {
        let body = parse_body(r#"{"ok":true}"#.to_string(), Some(DataFormat::Json)).unwrap();
        assert_eq!(body.as_json().unwrap()["ok"], serde_json::json!(true));
    }

    #[test]
    fn test_parse_body_json_malformed_is_decode_error() {
        let result = parse_body("{truncated".to_string(), Some(DataFormat::Json));
        assert!(matches!(result, Err(DecodeError::Json { .. })));
    }

    #[test]
    fn test_parse_body_xml() {
        let body = parse_body(
            "<root><item>one</item></root>".to_string(),
            Some(DataFormat::Xml),
        )
        .unwrap();
        let element = body.as_xml().unwrap();
        assert_eq!(element.name, "root");
        assert!(element.get_child("item").is_some());
    }

    #[test]
    fn test_parse_body_xml_malformed_is_decode_error() {
        let result = parse_body("<root><unclosed>".to_string(), Some(DataFormat::Xml));
        assert!(matches!(result, Err(DecodeError::Xml { .. })));
    }

    #[test]
    fn test_parse_body_none_is_text() {
        let body = parse_body("just text".to_string(), None).unwrap();
        assert_eq!(body.as_text(), Some("just text"));
    }
}
