//! HTTP digest authentication (RFC 2617, MD5 with `qop=auth`).

use md5::{Digest, Md5};
use tracing::debug;

/// User credentials for the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DigestChallenge {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    qop_auth: bool,
}

/// Credential store of a connector.
///
/// Holds the last accepted challenge so later requests authenticate
/// preemptively. Cleared whenever the device rejects it.
#[derive(Debug)]
pub struct AuthStore {
    credentials: Option<Credentials>,
    challenge: Option<DigestChallenge>,
    nonce_count: u32,
}

impl AuthStore {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            challenge: None,
            nonce_count: 0,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Forget the cached challenge.
    pub fn clear(&mut self) {
        self.challenge = None;
        self.nonce_count = 0;
    }

    /// Adopt the challenge of a `WWW-Authenticate` header.
    ///
    /// Returns `false` for non-digest schemes or incomplete challenges.
    pub fn accept_challenge(&mut self, header: &str) -> bool {
        match parse_challenge(header) {
            Some(challenge) => {
                debug!(realm = %challenge.realm, "Accepted digest challenge");
                self.challenge = Some(challenge);
                self.nonce_count = 0;
                true
            }
            None => false,
        }
    }

    /// `Authorization` header value for a request, if a challenge is known.
    pub fn authorization(&mut self, method: &str, uri: &str) -> Option<String> {
        let credentials = self.credentials.as_ref()?;
        let challenge = self.challenge.as_ref()?;

        self.nonce_count += 1;
        let nc = format!("{:08x}", self.nonce_count);
        let cnonce = format!("{:016x}", rand::random::<u64>());

        Some(authorization_header(
            credentials,
            challenge,
            method,
            uri,
            &nc,
            &cnonce,
        ))
    }
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn authorization_header(
    credentials: &Credentials,
    challenge: &DigestChallenge,
    method: &str,
    uri: &str,
    nc: &str,
    cnonce: &str,
) -> String {
    let ha1 = md5_hex(&format!(
        "{}:{}:{}",
        credentials.user, challenge.realm, credentials.password
    ));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));

    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm=MD5",
        credentials.user, challenge.realm, challenge.nonce, uri
    );

    if challenge.qop_auth {
        let response = md5_hex(&format!(
            "{}:{}:{}:{}:auth:{}",
            ha1, challenge.nonce, nc, cnonce, ha2
        ));
        header.push_str(&format!(
            ", response=\"{}\", qop=auth, nc={}, cnonce=\"{}\"",
            response, nc, cnonce
        ));
    } else {
        let response = md5_hex(&format!("{}:{}:{}", ha1, challenge.nonce, ha2));
        header.push_str(&format!(", response=\"{}\"", response));
    }

    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(", opaque=\"{}\"", opaque));
    }

    header
}

fn parse_challenge(header: &str) -> Option<DigestChallenge> {
    let header = header.trim();
    let (scheme, params) = header.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("digest") {
        return None;
    }

    let mut realm = None;
    let mut nonce = None;
    let mut opaque = None;
    let mut qop_auth = false;

    for (key, value) in parse_params(params) {
        match key.to_ascii_lowercase().as_str() {
            "realm" => realm = Some(value),
            "nonce" => nonce = Some(value),
            "opaque" => opaque = Some(value),
            "qop" => qop_auth = value.split(',').any(|q| q.trim() == "auth"),
            _ => {}
        }
    }

    Some(DigestChallenge {
        realm: realm?,
        nonce: nonce?,
        opaque,
        qop_auth,
    })
}

/// Split `k1="v, 1", k2=v2` into pairs, honoring quoted commas.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.next().is_none() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }

    pairs
}
