//! Error types for the trustprobe harness
//!
//! Three distinct taxonomies, kept deliberately separate:
//!
//! - [`TransportError`] — tagged failures reported by the `fetch` capability.
//!   Trust-decision failures (untrusted signer, expired validity, hostname
//!   mismatch, self-signed leaf, revocation) are distinguishable from every
//!   other failure mode so that trust classification is never inferred from
//!   a catch-all.
//! - [`HandshakeError`] — terminal per-target results of the Digest
//!   challenge-response handshake. Never a process crash.
//! - [`ProbeError`] — unrecoverable harness faults (malformed configuration).
//!   The only errors that abort a run.

use serde::{Deserialize, Serialize};

/// Result type for harness-level operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Failure modes reported by the transport collaborator
///
/// The TLS-prefixed kinds are *trust decisions*: the transport's verdict on
/// a presented certificate chain. Everything else is an unrelated transport
/// failure and must never be folded into a trust verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// Certificate chain does not lead to a trusted root
    TlsUntrusted,
    /// Certificate validity period has expired (or not yet begun)
    TlsExpired,
    /// Certificate does not cover the requested hostname
    TlsHostnameMismatch,
    /// Leaf certificate is self-signed
    TlsSelfSigned,
    /// Certificate has been revoked
    TlsRevoked,
    /// TLS failure that is not a certificate trust verdict (protocol error,
    /// bad encoding, unsupported algorithm)
    TlsOther,
    /// No response within the configured deadline
    Timeout,
    /// TCP connection refused by the peer
    ConnectionRefused,
    /// Hostname resolution failed
    Dns,
    /// Any other transport failure
    Other,
}

impl TransportErrorKind {
    /// Whether this kind represents a certificate trust verdict.
    ///
    /// `TlsRevoked` counts: a revocation verdict is a trust verdict.
    /// `TlsOther` does not: an odd TLS failure must surface as inconclusive
    /// rather than silently counting as a rejection.
    pub fn is_trust_decision(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::TlsUntrusted
                | TransportErrorKind::TlsExpired
                | TransportErrorKind::TlsHostnameMismatch
                | TransportErrorKind::TlsSelfSigned
                | TransportErrorKind::TlsRevoked
        )
    }

    /// Short label for log lines and console output
    pub fn label(&self) -> &'static str {
        match self {
            TransportErrorKind::TlsUntrusted => "tls-untrusted",
            TransportErrorKind::TlsExpired => "tls-expired",
            TransportErrorKind::TlsHostnameMismatch => "tls-hostname-mismatch",
            TransportErrorKind::TlsSelfSigned => "tls-self-signed",
            TransportErrorKind::TlsRevoked => "tls-revoked",
            TransportErrorKind::TlsOther => "tls-other",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::ConnectionRefused => "connection-refused",
            TransportErrorKind::Dns => "dns",
            TransportErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A failure reported by the `fetch` capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    /// Tagged failure mode
    pub kind: TransportErrorKind,
    /// Detailed message
    pub message: String,
}

impl TransportError {
    /// Create a new transport error
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// Create a DNS resolution error
    pub fn dns(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Dns, message)
    }

    /// Create an uncategorized transport error
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Whether this failure is a certificate trust verdict
    pub fn is_trust_decision(&self) -> bool {
        self.kind.is_trust_decision()
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport error ({}): {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

/// Terminal failure of a Digest handshake attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeError {
    /// The 401 response carried no usable Digest challenge
    NoDigestChallenge,
    /// The server rejected a correctly formed authenticated request
    CredentialsRejected,
    /// A response status that fits neither state of the handshake
    UnexpectedResponse {
        /// The HTTP status that was received
        status: u16,
    },
    /// The transport failed before a verdict could be reached
    TransportFailure(TransportError),
}

impl std::fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakeError::NoDigestChallenge => {
                write!(f, "server offered no Digest challenge")
            }
            HandshakeError::CredentialsRejected => {
                write!(f, "server rejected the supplied credentials")
            }
            HandshakeError::UnexpectedResponse { status } => {
                write!(f, "unexpected HTTP status {}", status)
            }
            HandshakeError::TransportFailure(e) => write!(f, "handshake transport failure: {}", e),
        }
    }
}

impl std::error::Error for HandshakeError {}

impl From<TransportError> for HandshakeError {
    fn from(err: TransportError) -> Self {
        HandshakeError::TransportFailure(err)
    }
}

/// Unrecoverable harness fault
///
/// Per-case trust rejections and handshake failures are classification data,
/// never `ProbeError`s. Only a malformed configuration aborts the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Configuration error
    ConfigError(String),
    /// URL parsing error
    UrlError(String),
    /// Internal error
    Internal(String),
}

impl ProbeError {
    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a new URL error
    pub fn url_error(msg: impl Into<String>) -> Self {
        Self::UrlError(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ProbeError::UrlError(msg) => write!(f, "URL error: {}", msg),
            ProbeError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProbeError {}

impl From<url::ParseError> for ProbeError {
    fn from(err: url::ParseError) -> Self {
        Self::UrlError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_decision_kinds() {
        assert!(TransportErrorKind::TlsUntrusted.is_trust_decision());
        assert!(TransportErrorKind::TlsExpired.is_trust_decision());
        assert!(TransportErrorKind::TlsHostnameMismatch.is_trust_decision());
        assert!(TransportErrorKind::TlsSelfSigned.is_trust_decision());
        assert!(TransportErrorKind::TlsRevoked.is_trust_decision());

        assert!(!TransportErrorKind::TlsOther.is_trust_decision());
        assert!(!TransportErrorKind::Timeout.is_trust_decision());
        assert!(!TransportErrorKind::ConnectionRefused.is_trust_decision());
        assert!(!TransportErrorKind::Dns.is_trust_decision());
        assert!(!TransportErrorKind::Other.is_trust_decision());
    }

    #[test]
    fn transport_error_serialization() {
        let err = TransportError::new(TransportErrorKind::TlsExpired, "not after 2024-01-01");
        let serialized = serde_json::to_string(&err).unwrap();
        let deserialized: TransportError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(err, deserialized);
    }

    #[test]
    fn handshake_error_from_transport() {
        let err: HandshakeError = TransportError::timeout("no response").into();
        match err {
            HandshakeError::TransportFailure(inner) => {
                assert_eq!(inner.kind, TransportErrorKind::Timeout)
            }
            _ => panic!("unexpected conversion"),
        }
    }
}
