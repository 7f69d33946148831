//! Scripted in-memory transport shared by the integration tests.
//!
//! Each URL gets a queue of steps; a fetch pops the next one. `VerifyDigest`
//! behaves like a protected server: it parses the Authorization header,
//! recomputes the expected response from its own knowledge of the secret
//! and the client-chosen cnonce/nc, and only then releases the follow-up
//! response.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use trustprobe::{
    digest_response, parse_challenge, ChallengeScheme, Credentials, DigestAlgorithm,
    DigestChallenge, Fetch, HttpExchange, TransportError, TransportErrorKind,
};

/// What the scripted server knows about one protected realm
#[derive(Clone)]
pub struct DigestServer {
    pub username: String,
    pub password: String,
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub algorithm: DigestAlgorithm,
    pub uri: String,
}

impl DigestServer {
    pub fn new(realm: &str, nonce: &str, username: &str, password: &str, uri: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            realm: realm.to_string(),
            nonce: nonce.to_string(),
            qop: Some("auth".to_string()),
            algorithm: DigestAlgorithm::Md5,
            uri: uri.to_string(),
        }
    }

    /// The WWW-Authenticate value this server would issue
    pub fn challenge_header(&self, stale: bool) -> String {
        let mut header = format!(
            "Digest realm=\"{}\", nonce=\"{}\", algorithm={}",
            self.realm,
            self.nonce,
            self.algorithm.token()
        );
        if let Some(qop) = &self.qop {
            header.push_str(&format!(", qop=\"{}\"", qop));
        }
        if stale {
            header.push_str(", stale=true");
        }
        header
    }

    /// Server-side check of an Authorization header value
    pub fn verify(&self, authorization: &str) -> bool {
        let Some((scheme, params)) = parse_challenge(authorization) else {
            return false;
        };
        if scheme != ChallengeScheme::Digest {
            return false;
        }
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        };

        let (Some(username), Some(nonce), Some(uri), Some(response)) =
            (get("username"), get("nonce"), get("uri"), get("response"))
        else {
            return false;
        };
        if username != self.username || nonce != self.nonce || uri != self.uri {
            return false;
        }

        let (nc, cnonce) = match &self.qop {
            Some(_) => {
                let (Some(nc), Some(cnonce)) = (get("nc"), get("cnonce")) else {
                    return false;
                };
                let Ok(nc) = u32::from_str_radix(nc, 16) else {
                    return false;
                };
                (nc, cnonce.to_string())
            }
            None => (1, String::new()),
        };

        let challenge = DigestChallenge {
            realm: self.realm.clone(),
            nonce: self.nonce.clone(),
            opaque: None,
            qop: self.qop.clone(),
            algorithm: self.algorithm,
            stale: false,
        };
        let expected = digest_response(
            &challenge,
            &Credentials::new(self.username.clone(), self.password.clone()),
            "GET",
            &self.uri,
            nc,
            &cnonce,
        );
        response == expected
    }
}

/// One scripted reaction to a fetch
pub enum Step {
    /// Return this exchange
    Respond {
        status: u16,
        headers: Vec<(String, String)>,
    },
    /// Fail with this transport error kind
    Fail(TransportErrorKind),
    /// Verify the Authorization header like a Digest server would; release
    /// `then` on success, a bare 401 on failure
    VerifyDigest { server: DigestServer, then: Box<Step> },
}

impl Step {
    pub fn ok(status: u16) -> Self {
        Step::Respond {
            status,
            headers: Vec::new(),
        }
    }

    pub fn challenge(status: u16, www_authenticate: &str) -> Self {
        Step::Respond {
            status,
            headers: vec![("WWW-Authenticate".to_string(), www_authenticate.to_string())],
        }
    }
}

/// Fetch implementation driven entirely by scripted steps
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, url: &str, steps: Vec<Step>) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(steps);
    }

    /// Every fetch this transport served, in order
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    fn resolve(step: Step, authorization: Option<&str>) -> Result<HttpExchange, TransportError> {
        match step {
            Step::Respond { status, headers } => Ok(HttpExchange {
                status,
                headers,
                body: Vec::new(),
            }),
            Step::Fail(kind) => Err(TransportError::new(kind, "scripted failure")),
            Step::VerifyDigest { server, then } => {
                let valid = authorization.is_some_and(|auth| server.verify(auth));
                if valid {
                    Self::resolve(*then, authorization)
                } else {
                    Ok(HttpExchange {
                        status: 401,
                        headers: Vec::new(),
                        body: Vec::new(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl Fetch for ScriptedTransport {
    async fn fetch(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<HttpExchange, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), authorization.map(str::to_string)));

        let step = self
            .routes
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| panic!("no scripted step left for {}", url));

        Self::resolve(step, authorization)
    }
}
