//! TLS trust verification harness
//!
//! Drives a fixed, ordered list of [`TrustCase`]s through the [`Fetch`]
//! capability and classifies each outcome. The classification keeps
//! transport trust orthogonal to application-level status:
//!
//! - a completed exchange means the transport trusted the peer, whatever
//!   the HTTP status was (a 404 on a trusted host is still "trusted");
//! - a tagged trust failure means the transport rejected the certificate —
//!   the *success* path for an expected-fail case;
//! - any other failure (DNS, timeout, refused connection, odd TLS protocol
//!   error) is inconclusive and is reported as its own signal, never folded
//!   into the trust tally as a rejection.
//!
//! Tallies are an explicit accumulator reduced from per-case outcomes; the
//! verifier holds no mutable state and a run never fails as a whole because
//! a case did.

use serde::Serialize;
use tracing::info;

use crate::error::{TransportError, TransportErrorKind};
use crate::transport::{Fetch, HttpExchange};

/// One target URL with its expected trust verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustCase {
    /// Target URL, fetched with no credentials
    pub url: String,
    /// Whether the transport is expected to trust the presented chain
    pub expected_trusted: bool,
}

impl TrustCase {
    /// Case expected to complete over a trusted transport
    pub fn trusted(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_trusted: true,
        }
    }

    /// Case expected to be rejected by the trust decision
    pub fn untrusted(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_trusted: false,
        }
    }
}

/// What the transport actually did for one case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrustObservation {
    /// The exchange completed; the transport trusted the peer
    Trusted {
        /// HTTP status of the completed exchange, recorded so an
        /// application-level failure stays visible but orthogonal
        status: u16,
    },
    /// The transport rejected the certificate chain
    Rejected(TransportErrorKind),
    /// The request failed for a reason unrelated to trust
    Inconclusive(TransportErrorKind),
}

impl std::fmt::Display for TrustObservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustObservation::Trusted { status } => write!(f, "trusted, HTTP {}", status),
            TrustObservation::Rejected(kind) => write!(f, "rejected: {}", kind),
            TrustObservation::Inconclusive(kind) => write!(f, "inconclusive: {}", kind),
        }
    }
}

/// Outcome of one case: the observation compared to the expectation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustOutcome {
    /// The case that was driven
    pub case: TrustCase,
    /// What the transport did
    pub observation: TrustObservation,
    /// Whether observation matched expectation
    pub passed: bool,
}

/// Running pass/fail counts reduced from outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrustTally {
    /// Cases whose observation matched the expectation
    pub pass_count: usize,
    /// Cases that did not match, including inconclusive ones
    pub fail_count: usize,
}

/// Full result of a run: per-case outcomes plus the reduced tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustReport {
    /// One outcome per case, in case order
    pub outcomes: Vec<TrustOutcome>,
    /// Reduced tally
    pub tally: TrustTally,
}

/// Classify a fetch result into a trust observation.
///
/// Pure; the orthogonality rules live here and nowhere else.
pub fn classify(result: Result<HttpExchange, TransportError>) -> TrustObservation {
    match result {
        Ok(exchange) => TrustObservation::Trusted {
            status: exchange.status,
        },
        Err(err) if err.is_trust_decision() => TrustObservation::Rejected(err.kind),
        Err(err) => TrustObservation::Inconclusive(err.kind),
    }
}

fn matches_expectation(observation: &TrustObservation, expected_trusted: bool) -> bool {
    match observation {
        TrustObservation::Trusted { .. } => expected_trusted,
        TrustObservation::Rejected(_) => !expected_trusted,
        // An unrelated failure confirms nothing either way
        TrustObservation::Inconclusive(_) => false,
    }
}

/// Drives trust cases through a [`Fetch`] transport
pub struct TrustVerifier<'a> {
    transport: &'a dyn Fetch,
}

impl<'a> std::fmt::Debug for TrustVerifier<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustVerifier").finish()
    }
}

impl<'a> TrustVerifier<'a> {
    /// Create a verifier over the given transport
    pub fn new(transport: &'a dyn Fetch) -> Self {
        Self { transport }
    }

    /// Run every case in order, each to completion before the next.
    ///
    /// Transport failures are classification data; nothing a case does can
    /// abort the run or skip a later case.
    pub async fn run(&self, cases: &[TrustCase]) -> TrustReport {
        let mut outcomes = Vec::with_capacity(cases.len());
        for case in cases {
            let result = self.transport.fetch(&case.url, None).await;
            let observation = classify(result);
            let passed = matches_expectation(&observation, case.expected_trusted);
            info!(
                url = %case.url,
                expected_trusted = case.expected_trusted,
                %observation,
                passed,
                "trust case evaluated"
            );
            outcomes.push(TrustOutcome {
                case: case.clone(),
                observation,
                passed,
            });
        }

        let tally = outcomes.iter().fold(TrustTally::default(), |mut t, o| {
            if o.passed {
                t.pass_count += 1;
            } else {
                t.fail_count += 1;
            }
            t
        });

        TrustReport { outcomes, tally }
    }
}
