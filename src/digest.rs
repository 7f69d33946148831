//! HTTP Digest authentication (RFC 7616 / RFC 2617)
//!
//! The handshake has two states plus terminal outcomes:
//!
//! 1. **Unauthenticated** — probe the target with no credentials. A 200 means
//!    the resource was never protected (reported distinctly); a 401 yields
//!    the server's challenge.
//! 2. **Challenged** — answer the challenge with a computed `Authorization`
//!    header. A 401 carrying `stale=true` earns exactly one retry against
//!    the fresh nonce; any other 401 is a credentials rejection.
//!
//! The response value itself is a pure function over
//! `(challenge, credentials, method, uri, nonce count, client nonce)` —
//! see [`digest_response`] — so it can be verified against the published
//! RFC test vectors without any network access.
//!
//! A parsed challenge is bound to the unauthenticated request that produced
//! it: nonce validity is server-scoped, so challenges are consumed by one
//! handshake and never cached.

use md5::Md5;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::error::{HandshakeError, TransportError};
use crate::transport::{Fetch, HttpExchange};

/// Caller-supplied credentials for the Digest handshake
///
/// The secret is redacted from `Debug` output and never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name sent in the `username` directive
    pub username: String,
    /// Shared secret; proven via keyed hash, never transmitted
    pub secret: String,
}

impl Credentials {
    /// Create credentials from a username and secret
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authentication scheme named by a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeScheme {
    /// HTTP Digest
    Digest,
    /// HTTP Basic
    Basic,
    /// Anything else
    Other,
}

impl ChallengeScheme {
    fn from_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("digest") {
            ChallengeScheme::Digest
        } else if token.eq_ignore_ascii_case("basic") {
            ChallengeScheme::Basic
        } else {
            ChallengeScheme::Other
        }
    }
}

/// Hash algorithm named by a Digest challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// MD5 (the default when the challenge names no algorithm)
    Md5,
    /// MD5-sess
    Md5Sess,
    /// SHA-256
    Sha256,
    /// SHA-256-sess
    Sha256Sess,
}

impl DigestAlgorithm {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "MD5" => Some(DigestAlgorithm::Md5),
            "MD5-SESS" => Some(DigestAlgorithm::Md5Sess),
            "SHA-256" => Some(DigestAlgorithm::Sha256),
            "SHA-256-SESS" => Some(DigestAlgorithm::Sha256Sess),
            _ => None,
        }
    }

    /// Wire token for the `algorithm` directive
    pub fn token(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Md5Sess => "MD5-sess",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha256Sess => "SHA-256-sess",
        }
    }

    fn is_session(&self) -> bool {
        matches!(self, DigestAlgorithm::Md5Sess | DigestAlgorithm::Sha256Sess)
    }

    fn hash(&self, data: &str) -> String {
        match self {
            DigestAlgorithm::Md5 | DigestAlgorithm::Md5Sess => {
                hex::encode(Md5::digest(data.as_bytes()))
            }
            DigestAlgorithm::Sha256 | DigestAlgorithm::Sha256Sess => {
                hex::encode(Sha256::digest(data.as_bytes()))
            }
        }
    }
}

/// Server challenge parameters extracted from a 401 response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    /// Protection realm
    pub realm: String,
    /// Server nonce
    pub nonce: String,
    /// Opaque value echoed back verbatim when present
    pub opaque: Option<String>,
    /// Negotiated quality of protection; only `auth` is answered, a
    /// challenge offering no acceptable qop is answered in RFC 2617
    /// compatibility mode without one
    pub qop: Option<String>,
    /// Hash algorithm the server asked for
    pub algorithm: DigestAlgorithm,
    /// Whether the server flagged the previous nonce as stale
    pub stale: bool,
}

impl DigestChallenge {
    fn from_params(params: &[(String, String)]) -> Option<Self> {
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };

        let realm = get("realm")?;
        let nonce = get("nonce")?;
        let algorithm = match get("algorithm") {
            Some(token) => DigestAlgorithm::from_token(&token)?,
            None => DigestAlgorithm::Md5,
        };
        let qop = get("qop").and_then(|offered| {
            offered
                .split(',')
                .map(str::trim)
                .find(|q| q.eq_ignore_ascii_case("auth"))
                .map(str::to_string)
        });
        let stale = get("stale").is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Some(Self {
            realm,
            nonce,
            opaque: get("opaque"),
            qop,
            algorithm,
            stale,
        })
    }
}

/// Split a header value into its comma-combined challenges.
///
/// RFC 7235 allows several challenges joined by commas in one header value:
/// after splitting at top-level commas, a piece that leads with a bare
/// scheme token starts a new challenge, while a `name=value` piece belongs
/// to the challenge before it. Quoted-string values with backslash escapes
/// are honoured throughout.
pub fn parse_challenges(value: &str) -> Vec<(ChallengeScheme, Vec<(String, String)>)> {
    let mut challenges: Vec<(ChallengeScheme, Vec<(String, String)>)> = Vec::new();
    for piece in split_outside_quotes(value) {
        let leading = piece.split_whitespace().next().unwrap_or(piece);
        if !leading.contains('=') {
            // Scheme token, possibly followed by its first parameter
            let rest = piece[leading.len()..].trim_start();
            let mut params = Vec::new();
            if let Some((key, raw)) = rest.split_once('=') {
                params.push((key.trim().to_string(), unquote(raw.trim())));
            }
            challenges.push((ChallengeScheme::from_token(leading), params));
        } else if let Some((_, params)) = challenges.last_mut() {
            if let Some((key, raw)) = piece.split_once('=') {
                params.push((key.trim().to_string(), unquote(raw.trim())));
            }
        }
    }
    challenges
}

/// First challenge in a header value.
///
/// Covers the single-challenge form of `WWW-Authenticate` and the
/// `Authorization` header, which always carries exactly one.
pub fn parse_challenge(value: &str) -> Option<(ChallengeScheme, Vec<(String, String)>)> {
    parse_challenges(value).into_iter().next()
}

fn split_outside_quotes(input: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        match c {
            '\\' if in_quotes && !escaped => escaped = true,
            '"' if !escaped => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                let piece = input[start..i].trim();
                if !piece.is_empty() {
                    pieces.push(piece);
                }
                start = i + 1;
                escaped = false;
            }
            _ => escaped = false,
        }
    }
    let tail = input[start..].trim();
    if !tail.is_empty() {
        pieces.push(tail);
    }
    pieces
}

fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    out
}

/// Pick the Digest challenge out of a 401 response, preferring Digest over
/// any other scheme the server offers, whether the challenges arrive in
/// separate headers or comma-combined in one.
pub fn select_digest_challenge(exchange: &HttpExchange) -> Option<DigestChallenge> {
    exchange
        .header_values("WWW-Authenticate")
        .into_iter()
        .flat_map(parse_challenges)
        .filter(|(scheme, _)| *scheme == ChallengeScheme::Digest)
        .find_map(|(_, params)| DigestChallenge::from_params(&params))
}

/// Compute the Digest `response` directive value.
///
/// Pure over its inputs; the caller supplies the client nonce and count so
/// the computation can be checked against the RFC 7616 vectors.
pub fn digest_response(
    challenge: &DigestChallenge,
    credentials: &Credentials,
    method: &str,
    uri: &str,
    nonce_count: u32,
    cnonce: &str,
) -> String {
    let alg = challenge.algorithm;
    let mut ha1 = alg.hash(&format!(
        "{}:{}:{}",
        credentials.username, challenge.realm, credentials.secret
    ));
    if alg.is_session() {
        ha1 = alg.hash(&format!("{}:{}:{}", ha1, challenge.nonce, cnonce));
    }
    let ha2 = alg.hash(&format!("{}:{}", method, uri));

    match &challenge.qop {
        Some(qop) => alg.hash(&format!(
            "{}:{}:{:08x}:{}:{}:{}",
            ha1, challenge.nonce, nonce_count, cnonce, qop, ha2
        )),
        None => alg.hash(&format!("{}:{}:{}", ha1, challenge.nonce, ha2)),
    }
}

/// Serialize the full `Authorization` header value answering a challenge
pub fn authorization_header(
    challenge: &DigestChallenge,
    credentials: &Credentials,
    method: &str,
    uri: &str,
    nonce_count: u32,
    cnonce: &str,
) -> String {
    let response = digest_response(challenge, credentials, method, uri, nonce_count, cnonce);

    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm={}",
        credentials.username, challenge.realm, challenge.nonce, uri, response,
        challenge.algorithm.token(),
    );
    if let Some(qop) = &challenge.qop {
        header.push_str(&format!(
            ", qop={}, nc={:08x}, cnonce=\"{}\"",
            qop, nonce_count, cnonce
        ));
    }
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(", opaque=\"{}\"", opaque));
    }
    header
}

/// Successful handshake result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSuccess {
    /// False when the resource answered 200 without ever issuing a
    /// challenge; such a target was not actually protected
    pub was_challenged: bool,
}

/// Drives the two-round Digest handshake over a [`Fetch`] transport
pub struct DigestAuthClient<'a> {
    transport: &'a dyn Fetch,
}

impl<'a> std::fmt::Debug for DigestAuthClient<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestAuthClient").finish()
    }
}

impl<'a> DigestAuthClient<'a> {
    /// Create a client over the given transport
    pub fn new(transport: &'a dyn Fetch) -> Self {
        Self { transport }
    }

    /// Run the handshake against `url` with the supplied credentials.
    ///
    /// Credentials are sent only after a challenge is issued. A `stale=true`
    /// 401 on the authenticated round is retried at most once against the
    /// fresh nonce.
    pub async fn authenticate(
        &self,
        url: &str,
        credentials: &Credentials,
    ) -> Result<AuthSuccess, HandshakeError> {
        let uri = request_uri(url)?;

        debug!(url, "digest probe: unauthenticated request");
        let probe = self.transport.fetch(url, None).await?;

        let mut challenge = match probe.status {
            200 => {
                debug!(url, "target answered 200 without a challenge");
                return Ok(AuthSuccess {
                    was_challenged: false,
                });
            }
            401 => select_digest_challenge(&probe).ok_or(HandshakeError::NoDigestChallenge)?,
            status => return Err(HandshakeError::UnexpectedResponse { status }),
        };

        let mut retried_stale = false;
        loop {
            // Fresh cnonce per attempt; the nonce is new on a stale retry so
            // the count restarts at 1.
            let cnonce = uuid::Uuid::new_v4().simple().to_string();
            let header = authorization_header(&challenge, credentials, "GET", &uri, 1, &cnonce);

            debug!(
                url,
                realm = %challenge.realm,
                algorithm = challenge.algorithm.token(),
                "digest probe: authenticated request"
            );
            let response = self.transport.fetch(url, Some(&header)).await?;

            match response.status {
                200 => {
                    return Ok(AuthSuccess {
                        was_challenged: true,
                    })
                }
                401 => {
                    if !retried_stale {
                        if let Some(next) = select_digest_challenge(&response) {
                            if next.stale {
                                debug!(url, "stale nonce, retrying once with fresh nonce");
                                challenge = next;
                                retried_stale = true;
                                continue;
                            }
                        }
                    }
                    return Err(HandshakeError::CredentialsRejected);
                }
                status => return Err(HandshakeError::UnexpectedResponse { status }),
            }
        }
    }
}

fn request_uri(url: &str) -> Result<String, HandshakeError> {
    let parsed = Url::parse(url).map_err(|e| {
        HandshakeError::TransportFailure(TransportError::other(format!(
            "invalid url {}: {}",
            url, e
        )))
    })?;
    Ok(match parsed.query() {
        Some(q) => format!("{}?{}", parsed.path(), q),
        None => parsed.path().to_string(),
    })
}
