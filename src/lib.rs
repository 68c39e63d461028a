//! Requester Core Library
//!
//! An async HTTP client engine: it issues outbound HTTP(S) requests, manages
//! per-request configuration (headers, cookies, proxies, authentication),
//! retries transport failures up to a bounded budget, follows redirects, and
//! decodes response bodies (text, JSON, XML, gzip-compressed) before handing
//! a typed [`Response`] to the caller.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`client`] - The [`Requester`] handle: verb entry points and proxy rotation
//! - [`config`] - Client defaults, per-request options, and the typed merge
//! - [`cookies`] - Cookie header codec and the client-scoped cookie jar
//! - [`encode`] - Form/query/JSON payload encoding and multipart assembly
//! - [`transport`] - The one-round-trip transport seam over reqwest
//! - [`decode`] - Gzip inflation and JSON/XML/text body decoding
//! - [`request`] - The retry/redirect/decode orchestration state machine
//! - [`response`] - The [`Response`] record and decoded [`Body`] value
//!
//! # Example
//!
//! ```no_run
//! use requester::{ClientConfig, Data, DataFormat, Requester, RequestOptions};
//!
//! # async fn example() -> Result<(), requester::RequestError> {
//! let client = Requester::new(ClientConfig {
//!     retries: 2,
//!     ..ClientConfig::default()
//! });
//!
//! let response = client
//!     .get(
//!         "https://api.example.com/search?kind=doc",
//!         RequestOptions {
//!             data: Some(Data::new().text("q", "rust")),
//!             data_format: Some(DataFormat::Json),
//!             ..RequestOptions::default()
//!         },
//!     )
//!     .await?;
//!
//! println!("status {}: {:?}", response.status, response.body);
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod cookies;
pub mod decode;
pub mod encode;
pub mod request;
pub mod response;
pub mod transport;

// Re-export commonly used types
pub use reqwest::header;

pub use client::Requester;
pub use config::{
    ClientConfig, Credentials, Data, DataFormat, Encoding, Field, FieldValue, ProxyServer,
    RequestOptions,
};
pub use cookies::{CookieJar, parse_set_cookie, serialize_cookies};
pub use decode::DecodeError;
pub use encode::EncodingError;
pub use request::RequestError;
pub use response::{Body, Response};
pub use transport::{HttpTransport, RawResponse, Transport, TransportError, TransportRequest};
