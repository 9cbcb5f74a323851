//! The fetch loop: connect, send the request line, read the header, follow
//! redirects, read the body.
//!
//! # Design
//! The loop is written against the `Connector` trait rather than a concrete
//! socket so the redirect bound, header handling and body rules can be
//! exercised with scripted in-memory streams. `transport::TlsConnector` is
//! the production implementation.
//!
//! Every exchange opens its own connection. The stream for a redirect hop is
//! dropped, and with it the connection closed, before the next hop connects.

use std::io::{self, BufRead, BufReader, Read, Write};

use url::Url;

use crate::error::FetchError;
use crate::response::{Response, StatusClass};
use crate::url::{resolve, scheme_of, with_default_scheme, DEFAULT_PORT, SCHEME};
use crate::wire::{build_request, parse_header, MAX_HEADER_LEN};

/// Connection attempts per fetch, the first request included.
pub const MAX_TRIES: usize = 5;

/// Opens one connection per exchange.
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&self, host: &str, port: u16) -> Result<Self::Stream, FetchError>;

    /// Classify an I/O error raised while talking over an open stream.
    fn io_error(&self, err: io::Error) -> FetchError {
        FetchError::Io(err)
    }
}

/// Fetch `url` over connections from `connector`.
///
/// Protocol failures come back as synthetic responses: `30` when a redirect
/// leaves geminispace, `40` for a malformed header or too many redirects.
/// Only transport failures are errors.
pub fn run<C: Connector>(connector: &C, url: &str) -> Result<Response, FetchError> {
    let mut url = with_default_scheme(url);
    let mut outcome = None;

    for attempt in 1..=MAX_TRIES {
        log::debug!("get {url} (attempt {attempt}/{MAX_TRIES})");

        if scheme_of(&url).as_deref() != Some(SCHEME) {
            return Ok(respond(&url, "30", &url, None));
        }
        let parsed = Url::parse(&url).map_err(|e| FetchError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let host = parsed
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| FetchError::InvalidUrl {
                url: url.clone(),
                reason: "missing host".to_string(),
            })?;
        let port = parsed.port().unwrap_or(DEFAULT_PORT);

        log::debug!("connecting to {host} port {port}");
        let mut stream = connector.connect(host, port)?;
        stream
            .write_all(&build_request(&url))
            .and_then(|()| stream.flush())
            .map_err(|e| connector.io_error(e))?;

        let mut reader = BufReader::new(stream);
        let raw = read_header(&mut reader).map_err(|e| connector.io_error(e))?;
        if raw.len() >= MAX_HEADER_LEN && !raw.ends_with(b"\n") {
            return Ok(respond(&url, "40", "Header too long", None));
        }

        let header = match parse_header(&raw) {
            Ok(header) => header,
            Err(diagnostic) => return Ok(respond(&url, "40", &diagnostic, None)),
        };
        log::debug!("{url}: {} {}", header.status, header.meta);

        let class = StatusClass::from_code(&header.status);
        if class == StatusClass::Redirect {
            url = resolve(&url, &header.meta);
            continue;
        }
        outcome = Some((header, class, reader));
        break;
    }

    let Some((header, class, mut reader)) = outcome else {
        return Ok(respond(&url, "40", "Too many redirects", None));
    };

    if class != StatusClass::Success {
        return Ok(respond(&url, &header.status, &header.meta, None));
    }

    let body = read_body(&mut reader).map_err(|e| connector.io_error(e))?;
    Ok(respond(&url, &header.status, &header.meta, Some(body)))
}

fn respond(url: &str, status: &str, meta: &str, body: Option<Vec<u8>>) -> Response {
    let response = Response::new(url, status, meta, body);
    log::info!("{url} {status} {}", response.len());
    response
}

/// Read up to and including the first LF, bounded by `MAX_HEADER_LEN`.
fn read_header<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut raw = Vec::new();
    match reader.by_ref().take(MAX_HEADER_LEN as u64).read_until(b'\n', &mut raw) {
        Ok(_) => Ok(raw),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(raw),
        Err(e) => Err(e),
    }
}

/// Read until the peer closes. Many servers close without a TLS
/// close_notify; that truncation is the normal end of a body here.
fn read_body<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    match reader.read_to_end(&mut body) {
        Ok(_) => Ok(body),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(body),
        Err(e) => Err(e),
    }
}
