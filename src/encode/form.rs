//! Form, query-string, and JSON body encoding.

use url::Url;
use url::form_urlencoded::Serializer;

use super::EncodingError;
use crate::config::Data;

/// Encodes the data fields as `application/x-www-form-urlencoded`,
/// preserving field order.
#[must_use]
pub(crate) fn form_urlencode(data: &Data) -> String {
    let mut serializer = Serializer::new(String::new());
    for field in data.fields() {
        serializer.append_pair(&field.name, &field.value_text());
    }
    serializer.finish()
}

/// Appends an encoded query string to the URL's existing query.
///
/// Joined with `&` when the URL already carries a query, else attached as
/// the query itself.
pub(crate) fn append_query(url: &mut Url, encoded: &str) {
    if encoded.is_empty() {
        return;
    }
    let joined = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded.to_string(),
    };
    url.set_query(Some(&joined));
}

/// Serializes the data fields as a JSON object of strings, preserving field
/// order in the serialized text.
pub(crate) fn json_body(data: &Data) -> Result<String, EncodingError> {
    // serde_json::Map does not preserve insertion order, so the object is
    // written through the serializer directly.
    use serde::ser::{SerializeMap, Serializer as _};

    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::new(&mut out);
    let mut map = serializer
        .serialize_map(Some(data.fields().len()))
        .map_err(|source| EncodingError::Json { source })?;
    for field in data.fields() {
        map.serialize_entry(&field.name, &field.value_text())
            .map_err(|source| EncodingError::Json { source })?;
    }
    map.end().map_err(|source| EncodingError::Json { source })?;

    Ok(String::from_utf8_lossy(&out).into_owned())
}
