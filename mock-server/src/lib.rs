//! A tiny gemini capsule for exercising clients over real TLS.
//!
//! `respond` is a pure router from request line to reply; `run` serves it
//! on a listener. The bundled certificates are test fixtures: a CA, a
//! server certificate for `127.0.0.1`/`localhost` signed by it, and a
//! client certificate signed by it.

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{self, RootCertStore, ServerConfig};
use tokio_rustls::TlsAcceptor;
use url::Url;

pub const CA_PEM: &str = include_str!("../certs/ca.pem");
pub const SERVER_CERT_PEM: &str = include_str!("../certs/server.pem");
pub const SERVER_KEY_PEM: &str = include_str!("../certs/server.key");

/// Longest URL accepted in a request line.
pub const MAX_REQUEST_LEN: usize = 1024;

/// How long `/slow` stalls before answering.
pub const SLOW_DELAY: Duration = Duration::from_secs(3);

pub const INDEX: &str = "# Mock capsule\n\
\n\
=> /plain Plain text\n\
=> redirect A relative redirect\n\
=> gemini://127.0.0.1/private Members only\n\
```\n\
=> /hidden not a link\n\
```\n\
=> https://example.com/ The web\n";

/// Path of a bundled fixture (`ca.pem`, `client.pem`, `client.key`, ...).
pub fn cert_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("certs").join(name)
}

/// What the capsule sends back for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Header line without the trailing CRLF.
    pub header: String,
    pub body: Vec<u8>,
    /// Stall before writing anything.
    pub delay: Option<Duration>,
}

impl Reply {
    fn header(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            body: Vec::new(),
            delay: None,
        }
    }

    fn ok(mime: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            header: format!("20 {mime}"),
            body: body.into(),
            delay: None,
        }
    }
}

/// Route one request line. `authenticated` says whether the peer presented
/// a client certificate signed by the test CA.
pub fn respond(request: &str, authenticated: bool) -> Reply {
    let request = request.trim_end_matches(['\r', '\n']);
    if request.len() > MAX_REQUEST_LEN {
        return Reply::header("59 Request too long");
    }
    let Ok(url) = Url::parse(request) else {
        return Reply::header("59 Bad request");
    };
    if url.scheme() != "gemini" {
        return Reply::header("53 Proxy request refused");
    }

    match url.path() {
        "" | "/" => Reply::ok("text/gemini; charset=utf-8", INDEX),
        "/plain" => Reply::ok("text/plain", "just text\n=> /not-a-link\n"),
        "/latin1" => Reply::ok("text/plain; charset=iso-8859-1", b"caf\xe9\n".to_vec()),
        "/bad-utf8" => Reply::ok("text/gemini", b"\xff\xfe=> /x\n".to_vec()),
        "/image" => Reply::ok("image/png", b"\x89PNG\r\n\x1a\n".to_vec()),
        "/redirect" => Reply::header("31 plain"),
        "/loop" => Reply::header("30 /loop"),
        "/elsewhere" => Reply::header("31 https://example.com/"),
        "/input" => match url.query() {
            Some(answer) if !answer.is_empty() => Reply::ok("text/plain", format!("Hello, {answer}!\n")),
            _ => Reply::header("10 What is your name?"),
        },
        "/gone" => Reply {
            body: b"these bytes must not reach the client".to_vec(),
            ..Reply::header("51 Gone away")
        },
        "/bad-header" => Reply::header("OK this is not gemini"),
        "/private" if authenticated => Reply::ok("text/gemini", "# Welcome back\n"),
        "/private" => Reply::header("60 Client certificate required"),
        "/slow" => Reply {
            delay: Some(SLOW_DELAY),
            ..Reply::ok("text/plain", "finally\n")
        },
        path => match path.strip_prefix("/chain/").and_then(|n| n.parse::<u32>().ok()) {
            Some(0) => Reply::ok("text/plain", "end of chain\n"),
            Some(n) => Reply::header(format!("30 /chain/{}", n - 1)),
            None => Reply::header("51 Not found"),
        },
    }
}

/// TLS settings for the capsule. Client certificates are optional; when
/// presented they must chain to the test CA.
pub fn tls_acceptor() -> io::Result<TlsAcceptor> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_slice_iter(CA_PEM.as_bytes()) {
        roots.add(cert.map_err(invalid)?).map_err(invalid)?;
    }
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
        .allow_unauthenticated()
        .build()
        .map_err(invalid)?;

    let chain = CertificateDer::pem_slice_iter(SERVER_CERT_PEM.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(invalid)?;
    let key = PrivateKeyDer::from_pem_slice(SERVER_KEY_PEM.as_bytes()).map_err(invalid)?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(invalid)?
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .map_err(invalid)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn invalid(err: impl Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

/// Accept connections forever, one task per connection.
pub async fn run(listener: TcpListener, acceptor: TlsAcceptor) -> Result<(), io::Error> {
    loop {
        let (tcp, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(acceptor, tcp).await {
                log::debug!("{peer}: {e}");
            }
        });
    }
}

async fn serve(acceptor: TlsAcceptor, tcp: TcpStream) -> io::Result<()> {
    let tls = acceptor.accept(tcp).await?;
    let authenticated = tls
        .get_ref()
        .1
        .peer_certificates()
        .is_some_and(|certs| !certs.is_empty());

    let mut reader = BufReader::new(tls);
    let mut line = Vec::new();
    (&mut reader)
        .take(MAX_REQUEST_LEN as u64 + 2)
        .read_until(b'\n', &mut line)
        .await?;
    let request = String::from_utf8_lossy(&line);

    let reply = respond(&request, authenticated);
    log::info!("{} -> {}", request.trim_end(), reply.header);
    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }

    let mut tls = reader.into_inner();
    tls.write_all(reply.header.as_bytes()).await?;
    tls.write_all(b"\r\n").await?;
    tls.write_all(&reply.body).await?;
    tls.shutdown().await
}
