//! # trustprobe
//!
//! Diagnostic harness verifying two independent security properties of an
//! HTTP client against remote services:
//!
//! - **TLS trust enforcement** — certificates signed by trusted authorities
//!   are accepted; self-signed, expired, and untrusted-root chains are
//!   rejected, and those verdicts are distinguishable from unrelated
//!   failures (DNS, timeouts, application-level errors).
//! - **HTTP Digest authentication** — the two-round challenge-response
//!   handshake succeeds when credentials are supplied only after a
//!   challenge is issued, including the single permitted retry on a stale
//!   nonce.
//!
//! ## Architecture
//!
//! ```text
//! trustprobe
//! ├── Fetch capability (transport seam)
//! │   └── RustlsTransport (tokio + rustls + webpki roots)
//! ├── TrustVerifier
//! │   ├── fixed ordered case table
//! │   └── classification: trusted / rejected / inconclusive
//! └── DigestAuthClient
//!     ├── unauthenticated probe + challenge selection
//!     └── RFC 7616 response computation (pure)
//! ```
//!
//! Both components consume the transport only through [`Fetch`]; neither
//! interacts with the other. Simulated transports implement the same trait,
//! which is how every classification and handshake property is tested
//! without touching the network.

#![forbid(unsafe_code)]
#![deny(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(missing_debug_implementations)]

pub mod config;
mod digest;
mod error;
mod transport;
mod trust;

pub use digest::{
    authorization_header, digest_response, parse_challenge, parse_challenges,
    select_digest_challenge, AuthSuccess, ChallengeScheme, Credentials, DigestAlgorithm,
    DigestAuthClient, DigestChallenge,
};
pub use error::{HandshakeError, ProbeError, Result, TransportError, TransportErrorKind};
pub use transport::{classify_tls_error, Fetch, HttpExchange, RustlsTransport};
pub use trust::{
    classify, TrustCase, TrustObservation, TrustOutcome, TrustReport, TrustTally, TrustVerifier,
};
