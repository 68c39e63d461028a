//! `multipart/form-data` body assembly.
//!
//! The whole body is assembled in memory before the transport attempt
//! begins: headers (boundary and `Content-Length`) must be finalized before
//! the request line is sent, so file fields are read eagerly. A file read
//! failure terminates only the current attempt and is reported like any
//! transport failure.

use tracing::debug;

use super::EncodingError;
use crate::config::{Data, FieldValue};

/// An assembled multipart body with its negotiated content type.
#[derive(Debug, Clone)]
pub(crate) struct MultipartBody {
    /// Full `Content-Type` header value, boundary included.
    pub(crate) content_type: String,
    /// The encoded body bytes.
    pub(crate) bytes: Vec<u8>,
}

/// Assembles the data fields into a `multipart/form-data` body.
///
/// Text fields are sent verbatim; file fields stream the referenced file's
/// bytes as the part content with an `application/octet-stream` part type.
pub(crate) async fn assemble(data: &Data) -> Result<MultipartBody, EncodingError> {
    let boundary = generate_boundary();
    let mut bytes = Vec::new();

    for field in data.fields() {
        bytes.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match &field.value {
            FieldValue::Text(text) => {
                bytes.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        field.name
                    )
                    .as_bytes(),
                );
                bytes.extend_from_slice(text.as_bytes());
            }
            FieldValue::File(path) => {
                let content = tokio::fs::read(path)
                    .await
                    .map_err(|e| EncodingError::file_read(&field.name, path.clone(), e))?;
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| field.name.clone());
                bytes.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        field.name
                    )
                    .as_bytes(),
                );
                bytes.extend_from_slice(&content);
            }
        }
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    debug!(
        fields = data.fields().len(),
        body_bytes = bytes.len(),
        "assembled multipart body"
    );

    Ok(MultipartBody {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        bytes,
    })
}

/// Generates a random part boundary unlikely to collide with field content.
fn generate_boundary() -> String {
    format!(
        "----requester-{:016x}{:016x}",
        rand::random::<u64>(),
        rand::random::<u64>()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_assemble_text_field() {
        let data = Data::new().text("something", "value");
        let body = assemble(&data).await.unwrap();

        let text = String::from_utf8(body.bytes).unwrap();
        assert!(text.contains("Content-Disposition: form-data; name=\"something\""));
        assert!(text.contains("value"));
        assert!(body.content_type.starts_with("multipart/form-data; boundary="));
    }

    #[tokio::test]
    async fn test_assemble_file_field_embeds_file_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"file content here").unwrap();

        let data = Data::new()
            .text("kind", "upload")
            .file("attachment", file.path());
        let body = assemble(&data).await.unwrap();

        let text = String::from_utf8_lossy(&body.bytes).into_owned();
        assert!(text.contains("name=\"attachment\""));
        assert!(text.contains("filename="));
        assert!(text.contains("Content-Type: application/octet-stream"));
        assert!(text.contains("file content here"));
    }

    #[tokio::test]
    async fn test_assemble_missing_file_is_encoding_error() {
        let data = Data::new().file("attachment", "/nonexistent/path/file.bin");
        let result = assemble(&data).await;

        match result {
            Err(EncodingError::FileRead { field, .. }) => assert_eq!(field, "attachment"),
            other => panic!("expected FileRead error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_assemble_terminates_with_final_boundary() {
        let data = Data::new().text("a", "1");
        let body = assemble(&data).await.unwrap();
        let text = String::from_utf8(body.bytes).unwrap();

        let boundary = body
            .content_type
            .split("boundary=")
            .nth(1)
            .unwrap()
            .to_string();
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn test_boundaries_are_unique() {
        assert_ne!(generate_boundary(), generate_boundary());
    }
}
