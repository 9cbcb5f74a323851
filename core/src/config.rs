//! Client configuration.
//!
//! Passed explicitly into `GeminiClient`; nothing here is global.

use std::env;
use std::time::Duration;

/// Environment variable holding the per-fetch deadline in whole seconds.
pub const TIMEOUT_ENV: &str = "GEMINI_TIMEOUT_SECS";

/// Environment variable toggling server certificate verification.
pub const VERIFY_SERVER_ENV: &str = "GEMINI_VERIFY_SERVER";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest deadline honoured; larger timeouts are clamped to it.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings applied to every `fetch` made by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Overall deadline for one fetch: connect, handshake, header and body,
    /// across every redirect hop.
    pub timeout: Duration,

    /// Validate the server certificate chain and host name.
    ///
    /// Off by default. Most capsules use self-signed certificates, so with
    /// this off the server identity is not checked at all.
    pub verify_server: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            verify_server: false,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `GEMINI_TIMEOUT_SECS` and `GEMINI_VERIFY_SERVER`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Set the overall deadline, clamped to `MAX_TIMEOUT`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_TIMEOUT);
        self
    }

    pub fn with_verify_server(mut self, verify_server: bool) -> Self {
        self.verify_server = verify_server;
        self
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 && secs <= MAX_TIMEOUT.as_secs() => {
                    config.timeout = Duration::from_secs(secs)
                }
                _ => log::warn!(
                    "ignoring {TIMEOUT_ENV}={raw:?}: expected between 1 and {} seconds",
                    MAX_TIMEOUT.as_secs()
                ),
            }
        }

        if let Some(raw) = lookup(VERIFY_SERVER_ENV) {
            match parse_flag(&raw) {
                Some(flag) => config.verify_server = flag,
                None => log::warn!("ignoring {VERIFY_SERVER_ENV}={raw:?}: expected true or false"),
            }
        }

        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
