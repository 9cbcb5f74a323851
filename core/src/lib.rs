//! Blocking client core for the gemini protocol.
//!
//! # Overview
//! Two operations: fetch a URL over TLS (following redirects up to a bound)
//! and parse a `text/gemini` body into display lines and an ordered list of
//! links. GUI shells, proxies and other front ends call into these and
//! render or forward the results.
//!
//! # Design
//! - `GeminiClient` holds only a `ClientConfig`; every fetch opens its own
//!   connections and shares nothing with other fetches.
//! - The fetch loop in `session` runs against a `Connector` trait, with
//!   `transport::TlsConnector` as the real implementation.
//! - Protocol outcomes, synthetic ones included, are `Response` values with
//!   a `StatusClass`; only transport failures are `FetchError`.
//! - Parsing is a pure fold over lines and never touches the `Response`.

pub mod client;
pub mod config;
pub mod error;
pub mod gemtext;
pub mod response;
pub mod session;
pub mod transport;
pub mod url;
pub mod wire;

pub use client::{fetch, Credentials, GeminiClient};
pub use config::ClientConfig;
pub use error::{DecodeError, FetchError};
pub use gemtext::{parse, Document, Link, RenderOptions};
pub use response::{MediaType, Response, StatusClass};
pub use crate::url::resolve;
