//! The terminal error taxonomy for top-level calls.

use thiserror::Error;

use crate::decode::DecodeError;
use crate::encode::EncodingError;
use crate::transport::TransportError;

/// Terminal failure of one top-level call.
///
/// Retryable failures (transport, encoding, decoding, predicate rejection)
/// are handled inside the orchestrator's bounded retry loop; a value of this
/// type is only returned once the budget is exhausted. The variant reports
/// the kind of the *last* failure and the number of attempts consumed, so
/// callers that only care about success/failure can treat the `Err` as a
/// sentinel while richer callers can branch on the cause.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The target URL could not be parsed; no attempt was made.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Every attempt failed at the transport level.
    #[error("transport failure requesting {url} after {attempts} attempt(s): {source}")]
    Transport {
        /// The URL that failed.
        url: String,
        /// Attempts consumed, the initial try included.
        attempts: u32,
        /// The last transport failure.
        #[source]
        source: TransportError,
    },

    /// The request payload could not be encoded.
    #[error("payload encoding failed after {attempts} attempt(s): {source}")]
    Encoding {
        /// Attempts consumed, the initial try included.
        attempts: u32,
        /// The last encoding failure.
        #[source]
        source: EncodingError,
    },

    /// The response body could not be decoded as the expected format.
    #[error("response decoding failed for {url} after {attempts} attempt(s): {source}")]
    Decode {
        /// The URL whose response failed to decode.
        url: String,
        /// Attempts consumed, the initial try included.
        attempts: u32,
        /// The last decode failure.
        #[source]
        source: DecodeError,
    },

    /// The caller's failure predicate rejected every delivered body.
    #[error("response from {url} rejected by failure predicate after {attempts} attempt(s)")]
    Rejected {
        /// The URL whose responses were rejected.
        url: String,
        /// Attempts consumed, the initial try included.
        attempts: u32,
    },
}

impl RequestError {
    /// Creates an invalid-URL error.
    pub(crate) fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a terminal transport error.
    pub(crate) fn transport(url: impl Into<String>, attempts: u32, source: TransportError) -> Self {
        Self::Transport {
            url: url.into(),
            attempts,
            source,
        }
    }

    /// Creates a terminal encoding error.
    pub(crate) fn encoding(attempts: u32, source: EncodingError) -> Self {
        Self::Encoding { attempts, source }
    }

    /// Creates a terminal decode error.
    pub(crate) fn decode(url: impl Into<String>, attempts: u32, source: DecodeError) -> Self {
        Self::Decode {
            url: url.into(),
            attempts,
            source,
        }
    }

    /// Creates a terminal predicate-rejection error.
    pub(crate) fn rejected(url: impl Into<String>, attempts: u32) -> Self {
        Self::Rejected {
            url: url.into(),
            attempts,
        }
    }

    /// Returns the number of attempts consumed before giving up
    /// (0 when no attempt was made).
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::InvalidUrl { .. } => 0,
            Self::Transport { attempts, .. }
            | Self::Encoding { attempts, .. }
            | Self::Decode { attempts, .. }
            | Self::Rejected { attempts, .. } => *attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_display_carries_url_and_attempts() {
        let error = RequestError::transport(
            "http://example.com/",
            3,
            TransportError::Timeout {
                url: "http://example.com/".to_string(),
            },
        );
        let message = error.to_string();
        assert!(message.contains("http://example.com/"), "got: {message}");
        assert!(message.contains("3 attempt"), "got: {message}");
        assert_eq!(error.attempts(), 3);
    }

    #[test]
    fn test_invalid_url_consumed_no_attempts() {
        let error = RequestError::invalid_url("not a url");
        assert_eq!(error.attempts(), 0);
        assert!(error.to_string().contains("not a url"));
    }

    #[test]
    fn test_rejected_display() {
        let error = RequestError::rejected("http://host/", 1);
        assert!(error.to_string().contains("failure predicate"));
    }
}
