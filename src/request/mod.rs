//! Request orchestration: the retry/redirect/decode state machine.
//!
//! One orchestrator instance owns the whole life of a top-level call: it
//! drives transport attempts, interprets each outcome against the retry and
//! redirect policy, decodes the body, applies the caller's failure
//! predicate, and returns exactly one terminal outcome.

pub(crate) mod orchestrator;

mod error;

pub use error::RequestError;
