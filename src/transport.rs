//! The `fetch` capability and its rustls-backed implementation
//!
//! Everything above this module consumes HTTP/TLS through the [`Fetch`]
//! trait: one call, one exchange, one tagged error. [`RustlsTransport`] is
//! the production implementation: tokio TCP, tokio-rustls with the webpki
//! root store, a hand-written HTTP/1.1 GET, and httparse for the response.
//!
//! The important part is [`classify_tls_error`]: every rustls certificate
//! verdict is mapped to an explicit [`TransportErrorKind`] so that callers
//! can distinguish "trust was enforced" from "the request failed for an
//! unrelated reason" without inspecting error strings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{CertificateError, ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::error::{TransportError, TransportErrorKind};

/// Upper bound on a buffered response, headers included
const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// A completed HTTP exchange as seen by the harness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpExchange {
    /// HTTP status code
    pub status: u16,
    /// Response headers in wire order; names are not normalized
    pub headers: Vec<(String, String)>,
    /// Response body bytes
    pub body: Vec<u8>,
}

impl HttpExchange {
    /// All values for a header name, case-insensitively, in wire order.
    ///
    /// Challenge headers (`WWW-Authenticate`) may legitimately repeat, so
    /// this returns every match rather than the first.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value for a header name, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The transport capability consumed by the harness
///
/// `authorization` carries a prebuilt `Authorization` header value when the
/// caller is answering a challenge; credentials themselves never cross this
/// boundary.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Perform one GET request and return the exchange or a tagged failure
    async fn fetch(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<HttpExchange, TransportError>;
}

/// Map a rustls error to the transport failure taxonomy.
///
/// rustls reports a self-signed leaf as `UnknownIssuer`, so the real
/// transport never produces `TlsSelfSigned`; simulated transports can.
pub fn classify_tls_error(err: &rustls::Error) -> TransportErrorKind {
    match err {
        rustls::Error::InvalidCertificate(cert_err) => match cert_err {
            CertificateError::Expired | CertificateError::NotValidYet => {
                TransportErrorKind::TlsExpired
            }
            CertificateError::NotValidForName => TransportErrorKind::TlsHostnameMismatch,
            CertificateError::UnknownIssuer | CertificateError::BadSignature => {
                TransportErrorKind::TlsUntrusted
            }
            CertificateError::Revoked => TransportErrorKind::TlsRevoked,
            _ => TransportErrorKind::TlsOther,
        },
        _ => TransportErrorKind::TlsOther,
    }
}

/// Production transport: tokio + rustls with the webpki root store
pub struct RustlsTransport {
    connector: TlsConnector,
    timeout: Duration,
}

impl std::fmt::Debug for RustlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustlsTransport")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RustlsTransport {
    /// Create a transport with the given per-call deadline.
    ///
    /// Root certificates come from `webpki-roots`; trust decisions are made
    /// entirely by rustls during the handshake.
    pub fn new(timeout: Duration) -> Self {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        }
    }

    async fn exchange(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<HttpExchange, TransportError> {
        let parsed = Url::parse(url)
            .map_err(|e| TransportError::other(format!("invalid url {}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| TransportError::other(format!("url {} has no host", url)))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| TransportError::other(format!("url {} has no port", url)))?;
        let use_tls = match parsed.scheme() {
            "https" => true,
            "http" => false,
            s => {
                return Err(TransportError::other(format!("unsupported scheme {}", s)));
            }
        };

        let mut addrs = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| TransportError::dns(format!("failed to resolve {}: {}", host, e)))?;
        let addr = addrs
            .next()
            .ok_or_else(|| TransportError::dns(format!("{} resolved to no addresses", host)))?;

        tracing::debug!(url, %addr, tls = use_tls, "connecting");

        let tcp = TcpStream::connect(addr).await.map_err(classify_io_error)?;

        let mut stream: Box<dyn AsyncStream> = if use_tls {
            let server_name = ServerName::try_from(host.clone()).map_err(|e| {
                TransportError::other(format!("invalid server name {}: {}", host, e))
            })?;
            let tls = self
                .connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| classify_handshake_error(&e))?;
            Box::new(tls)
        } else {
            Box::new(tcp)
        };

        let request = build_request(&parsed, &host, port, authorization);
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(classify_io_error)?;
        stream.flush().await.map_err(classify_io_error)?;

        let raw = read_response(&mut stream).await?;
        parse_response(&raw)
    }
}

#[async_trait]
impl Fetch for RustlsTransport {
    async fn fetch(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<HttpExchange, TransportError> {
        match tokio::time::timeout(self.timeout, self.exchange(url, authorization)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(format!(
                "no response from {} within {:?}",
                url, self.timeout
            ))),
        }
    }
}

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

fn build_request(url: &Url, host: &str, port: u16, authorization: Option<&str>) -> String {
    let target = match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    };
    // Host header omits default ports per RFC 7230
    let default_port = if url.scheme() == "https" { 443 } else { 80 };
    let host_header = if port == default_port {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    };

    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: trustprobe/{}\r\nAccept: */*\r\nConnection: close\r\n",
        target,
        host_header,
        env!("CARGO_PKG_VERSION"),
    );
    if let Some(auth) = authorization {
        request.push_str("Authorization: ");
        request.push_str(auth);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    request
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn read_response(
    stream: &mut Box<dyn AsyncStream>,
) -> Result<Vec<u8>, TransportError> {
    let mut buf = Vec::with_capacity(8 * 1024);
    let mut tmp = [0u8; 4096];
    loop {
        match stream.read(&mut tmp).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&tmp[..n]);
                if buf.len() > MAX_RESPONSE_BYTES {
                    return Err(TransportError::other("response exceeds buffer limit"));
                }
            }
            // Some servers drop the connection without close_notify; accept
            // that once the header block is complete.
            Err(_) if find_headers_end(&buf).is_some() => break,
            Err(e) => return Err(classify_io_error(e)),
        }
    }
    Ok(buf)
}

fn parse_response(raw: &[u8]) -> Result<HttpExchange, TransportError> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut resp = httparse::Response::new(&mut headers);

    let body_start = match resp.parse(raw) {
        Ok(httparse::Status::Complete(amt)) => amt,
        Ok(httparse::Status::Partial) => {
            return Err(TransportError::other(
                "connection closed before headers completed",
            ));
        }
        Err(e) => {
            return Err(TransportError::other(format!("invalid response: {}", e)));
        }
    };

    let status = resp
        .code
        .ok_or_else(|| TransportError::other("response missing status code"))?;
    let headers: Vec<(String, String)> = resp
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let mut body = raw[body_start..].to_vec();
    // With Connection: close the body is EOF-delimited; trim to
    // Content-Length when the server declared one.
    let declared = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok());
    if let Some(len) = declared {
        if body.len() > len {
            body.truncate(len);
        }
    }

    Ok(HttpExchange {
        status,
        headers,
        body,
    })
}

fn classify_io_error(err: std::io::Error) -> TransportError {
    let kind = match err.kind() {
        std::io::ErrorKind::ConnectionRefused => TransportErrorKind::ConnectionRefused,
        std::io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
        _ => TransportErrorKind::Other,
    };
    TransportError::new(kind, err.to_string())
}

fn classify_handshake_error(err: &std::io::Error) -> TransportError {
    if let Some(tls) = err.get_ref().and_then(|e| e.downcast_ref::<rustls::Error>()) {
        TransportError::new(classify_tls_error(tls), tls.to_string())
    } else {
        let kind = match err.kind() {
            std::io::ErrorKind::ConnectionRefused => TransportErrorKind::ConnectionRefused,
            std::io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
            _ => TransportErrorKind::Other,
        };
        TransportError::new(kind, err.to_string())
    }
}
