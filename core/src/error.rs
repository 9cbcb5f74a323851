//! Error types for the gemini client core.
//!
//! # Design
//! Protocol-level outcomes (bad header, too many redirects, a redirect out of
//! geminispace, an incomplete credential bundle) are never errors: they come
//! back as a `Response` carrying a synthetic status. The types here cover what
//! is left over, the transport failures the caller has to decide about, and
//! body decoding failures.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Transport-level failures returned by `fetch`.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The URL could not be parsed or has no host to connect to.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// DNS resolution failed.
    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Every resolved address refused or reset the connection.
    #[error("could not connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The TLS handshake did not complete.
    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The per-fetch deadline expired.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A CA certificate, client certificate or key file could not be used.
    #[error("could not load {}: {reason}", path.display())]
    Credentials { path: PathBuf, reason: String },

    /// The TLS configuration was rejected by rustls.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FetchError {
    /// Map an I/O error from an established session, folding deadline expiry
    /// into `Timeout`.
    pub(crate) fn from_io(err: io::Error, timeout: Duration) -> Self {
        if is_timeout(&err) {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Io(err)
        }
    }
}

pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Failures turning a response body into text.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("response has no body")]
    NoBody,

    #[error("response is not textual: '{meta}'")]
    NotText { meta: String },

    #[error("unknown charset '{charset}'")]
    UnknownCharset { charset: String },

    /// The body contains byte sequences that are invalid in the declared
    /// charset.
    #[error("body is not valid {charset}")]
    Malformed { charset: String },
}
