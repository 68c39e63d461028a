//! Request payload encoding.
//!
//! Turns a request's ordered data fields into the bytes and headers of the
//! outgoing body: `application/x-www-form-urlencoded` form bodies and query
//! strings ([`form`]), JSON bodies for callers that set an
//! `application/json` content type, and `multipart/form-data` assembly with
//! file fields ([`multipart`]).

pub(crate) mod form;
pub(crate) mod multipart;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while encoding a request payload.
///
/// Encoding failures never crash the process; the orchestrator reports them
/// through the same bounded retry path as transport failures.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// A multipart file field referenced a file that could not be read.
    #[error("failed to read multipart file {path} for field {field}: {source}")]
    FileRead {
        /// Name of the multipart field.
        field: String,
        /// Path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Request data could not be serialized as JSON.
    #[error("failed to serialize request data as JSON: {source}")]
    Json {
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl EncodingError {
    /// Creates a file-read error for a multipart field.
    pub(crate) fn file_read(
        field: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::FileRead {
            field: field.into(),
            path: path.into(),
            source,
        }
    }
}
