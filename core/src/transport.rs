//! TLS connections for the fetch loop.
//!
//! # Design
//! One `TlsConnector` is built per fetch from the client config and the
//! caller's credentials, then hands out a fresh rustls session per hop.
//!
//! Server certificates are not validated unless `verify_server` is set, since
//! most capsules present self-signed certificates. Handshake signatures are
//! still checked, so the peer must hold the key for the certificate it
//! presents.
//!
//! Every socket operation is bounded by a single deadline fixed when the
//! connector is built, so one fetch cannot outlive `ClientConfig::timeout`
//! however many hops it takes.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme, StreamOwned};

use crate::client::Credentials;
use crate::config::{ClientConfig, MAX_TIMEOUT};
use crate::error::{is_timeout, FetchError};
use crate::session::Connector;

/// An encrypted stream to one server.
pub type TlsStream = StreamOwned<ClientConnection, DeadlineStream>;

/// Opens TLS connections for the duration of one fetch.
pub struct TlsConnector {
    tls: Arc<rustls::ClientConfig>,
    timeout: Duration,
    deadline: Instant,
}

impl fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnector")
            .field("timeout", &self.timeout)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl TlsConnector {
    /// Build the TLS configuration. Credential files are read here; a
    /// missing or unusable file is a `Credentials` error. Credentials are
    /// only used when all three paths are present.
    pub fn new(config: &ClientConfig, credentials: &Credentials) -> Result<Self, FetchError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?;

        let ca_cert = match &credentials.ca_cert {
            Some(path) if credentials.is_complete() => Some(load_certs(path)?),
            _ => None,
        };

        let builder = if config.verify_server {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            for cert in ca_cert.into_iter().flatten() {
                roots.add(cert)?;
            }
            builder.with_root_certificates(roots)
        } else {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
        };

        let tls = match (&credentials.client_cert, &credentials.key) {
            (Some(cert_path), Some(key_path)) if credentials.is_complete() => {
                let chain = load_certs(cert_path)?;
                let key = load_key(key_path)?;
                builder.with_client_auth_cert(chain, key)?
            }
            _ => builder.with_no_client_auth(),
        };

        // `timeout` is a public field and can skip the setter's clamp.
        let timeout = config.timeout.min(MAX_TIMEOUT);
        Ok(Self {
            tls: Arc::new(tls),
            timeout,
            deadline: Instant::now() + timeout,
        })
    }

    fn remaining(&self) -> Result<Duration, FetchError> {
        self.deadline
            .checked_duration_since(Instant::now())
            .filter(|left| !left.is_zero())
            .ok_or(FetchError::Timeout(self.timeout))
    }

    fn open_tcp(&self, host: &str, port: u16) -> Result<TcpStream, FetchError> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| FetchError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect();

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.remaining()?) {
                Ok(tcp) => return Ok(tcp),
                Err(e) if is_timeout(&e) => return Err(FetchError::Timeout(self.timeout)),
                Err(e) => {
                    log::debug!("connect to {addr} failed: {e}");
                    last_err = e;
                }
            }
        }
        Err(FetchError::Connect {
            host: host.to_string(),
            port,
            source: last_err,
        })
    }
}

impl Connector for TlsConnector {
    type Stream = TlsStream;

    fn connect(&self, host: &str, port: u16) -> Result<TlsStream, FetchError> {
        let server_name = ServerName::try_from(host)
            .map_err(|e| FetchError::InvalidUrl {
                url: host.to_string(),
                reason: e.to_string(),
            })?
            .to_owned();

        let tcp = self.open_tcp(host, port)?;
        let mut sock = DeadlineStream {
            inner: tcp,
            deadline: self.deadline,
        };
        let mut conn = ClientConnection::new(Arc::clone(&self.tls), server_name)?;

        while conn.is_handshaking() {
            conn.complete_io(&mut sock).map_err(|source| {
                if is_timeout(&source) {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::Handshake {
                        host: host.to_string(),
                        source,
                    }
                }
            })?;
        }
        log::debug!("{host}:{port} negotiated {:?}", conn.protocol_version());

        Ok(StreamOwned::new(conn, sock))
    }

    fn io_error(&self, err: io::Error) -> FetchError {
        FetchError::from_io(err, self.timeout)
    }
}

/// A TCP stream whose every read and write is cut off at a fixed instant.
#[derive(Debug)]
pub struct DeadlineStream {
    inner: TcpStream,
    deadline: Instant,
}

impl DeadlineStream {
    fn remaining(&self) -> io::Result<Duration> {
        self.deadline
            .checked_duration_since(Instant::now())
            .filter(|left| !left.is_zero())
            .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "deadline expired"))
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.set_read_timeout(Some(self.remaining()?))?;
        self.inner.read(buf).map_err(timed_out)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.set_write_timeout(Some(self.remaining()?))?;
        self.inner.write(buf).map_err(timed_out)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Socket timeouts surface as `WouldBlock` on some platforms.
fn timed_out(err: io::Error) -> io::Error {
    if err.kind() == io::ErrorKind::WouldBlock {
        io::Error::new(io::ErrorKind::TimedOut, err)
    } else {
        err
    }
}

/// Accepts whatever certificate the server presents.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, FetchError> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| credentials_error(path, e))?;
    if certs.is_empty() {
        return Err(FetchError::Credentials {
            path: path.to_path_buf(),
            reason: "no certificates found".to_string(),
        });
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, FetchError> {
    PrivateKeyDer::from_pem_file(path).map_err(|e| credentials_error(path, e))
}

fn credentials_error(path: &Path, err: rustls::pki_types::pem::Error) -> FetchError {
    FetchError::Credentials {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
