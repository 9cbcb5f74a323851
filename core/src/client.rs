//! Entry point for callers: fetch a URL, optionally with a client
//! certificate.
//!
//! # Design
//! `GeminiClient` holds only its `ClientConfig` and carries no state between
//! calls, so one client can be shared across threads and each `fetch` is an
//! independent blocking exchange. Escalating to a client certificate after a
//! `60` is the caller's second `fetch`, not a retry inside this one.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::response::Response;
use crate::session;
use crate::transport::TlsConnector;
use crate::url::with_default_scheme;

/// Paths to a CA certificate, client certificate and private key, all PEM.
///
/// Either all three or none must be given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl Credentials {
    /// Anonymous: no client certificate.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(ca_cert: impl Into<PathBuf>, client_cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            ca_cert: Some(ca_cert.into()),
            client_cert: Some(client_cert.into()),
            key: Some(key.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ca_cert.is_none() && self.client_cert.is_none() && self.key.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.ca_cert.is_some() && self.client_cert.is_some() && self.key.is_some()
    }
}

/// Blocking gemini client.
#[derive(Debug, Clone, Default)]
pub struct GeminiClient {
    config: ClientConfig,
}

impl GeminiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch `url`, following up to four redirects.
    ///
    /// A bare `host/path` is taken as a gemini URL. A partial credential
    /// bundle yields a `60` response without touching the network.
    /// Protocol outcomes, including failures, are `Ok`; only transport
    /// problems (resolution, connection, handshake, unreadable credential
    /// files, deadline expiry) are errors.
    pub fn fetch(&self, url: &str, credentials: &Credentials) -> Result<Response, FetchError> {
        let url = with_default_scheme(url);

        if !credentials.is_empty() && !credentials.is_complete() {
            log::warn!("{url}: incomplete client credentials");
            return Ok(Response::new(
                url,
                "60",
                "Need a CA certificate, client certificate and client key to proceed.",
                None,
            ));
        }

        let connector = TlsConnector::new(&self.config, credentials)?;
        session::run(&connector, &url)
    }
}

/// Fetch with the default configuration.
pub fn fetch(url: &str, credentials: &Credentials) -> Result<Response, FetchError> {
    GeminiClient::default().fetch(url, credentials)
}
