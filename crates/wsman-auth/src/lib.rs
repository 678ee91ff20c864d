// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! HTTP Digest authentication (RFC 2617) for AMT WSMAN sessions.
//!
//! AMT answers the first request of a session with `401` and a
//! `WWW-Authenticate: Digest ...` challenge. This crate:
//! - parses that challenge ([`parse_challenge`])
//! - keeps the per-challenge nonce count and produces `Authorization`
//!   header values ([`DigestClient`])
//! - frames complete `POST /wsman` requests ([`Authenticator`])
//!
//! Only MD5 with `qop=auth` is spoken; that is all AMT firmware offers.
//!
//! # Examples
//!
//! ```
//! # use wsman_auth::*;
//! # use wsman_core::{BodyFraming, Credentials, SessionEndpoint};
//! let endpoint = SessionEndpoint::new("10.0.0.5", 16992);
//! let mut auth = Authenticator::new(
//!     endpoint,
//!     Credentials::new("admin", "P@ssw0rd"),
//!     BodyFraming::ContentLength,
//! );
//!
//! // First request of a session carries no Authorization header.
//! let first = auth.build_message("<Envelope/>")?;
//! assert!(!first.windows(14).any(|w| w == b"Authorization:"));
//!
//! auth.install_challenge(parse_challenge(
//!     r#"Digest realm="Digest:ABC", nonce="n0nce", qop="auth""#,
//! ));
//! let second = auth.build_message("<Envelope/>")?;
//! assert!(second.windows(14).any(|w| w == b"Authorization:"));
//! # Ok::<(), AuthError>(())
//! ```

use bytes::Bytes;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use smol_str::SmolStr;
use tracing::debug;
use wsman_core::{BodyFraming, Credentials, Headers, HttpRequest, MessageError, SessionEndpoint};
use wsman_parse::serialize_request;

/// The only quality of protection this client speaks.
pub const QOP_AUTH: &str = "auth";

const CNONCE_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No request body was supplied.
    EmptyBody,
    /// The request could not be represented (e.g. body over the size limit).
    Message(MessageError),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBody => write!(f, "request body is empty"),
            Self::Message(err) => write!(f, "cannot build request: {}", err),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<MessageError> for AuthError {
    fn from(err: MessageError) -> Self {
        Self::Message(err)
    }
}

/// Digest challenge as issued by the device in `WWW-Authenticate`.
///
/// Replaced as a whole whenever the device issues a new challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: SmolStr,
    pub nonce: SmolStr,
    /// Always [`QOP_AUTH`] once parsed.
    pub qop: SmolStr,
    pub stale: Option<bool>,
    pub opaque: Option<SmolStr>,
}

impl DigestChallenge {
    pub fn new(realm: impl Into<SmolStr>, nonce: impl Into<SmolStr>) -> Self {
        Self {
            realm: realm.into(),
            nonce: nonce.into(),
            qop: SmolStr::new_inline(QOP_AUTH),
            stale: None,
            opaque: None,
        }
    }

    /// `false` when realm or nonce is missing; such a challenge cannot
    /// produce a valid response.
    pub fn is_usable(&self) -> bool {
        !self.realm.is_empty() && !self.nonce.is_empty()
    }
}

/// Parses a `WWW-Authenticate` header value.
///
/// Parsing is lenient: unknown parameters are ignored and a missing or
/// malformed header yields empty fields (see [`DigestChallenge::is_usable`]).
/// Whatever `qop` the device advertises, the result carries `auth`.
pub fn parse_challenge(header: &str) -> DigestChallenge {
    let mut challenge = DigestChallenge {
        qop: SmolStr::new_inline(QOP_AUTH),
        ..DigestChallenge::default()
    };

    for (key, value) in parse_auth_params(header) {
        match key.to_ascii_lowercase().as_str() {
            "realm" => challenge.realm = SmolStr::new(value),
            "nonce" => challenge.nonce = SmolStr::new(value),
            "opaque" => challenge.opaque = Some(SmolStr::new(value)),
            "stale" => challenge.stale = Some(value.eq_ignore_ascii_case("true")),
            _ => {}
        }
    }

    challenge
}

fn strip_scheme(value: &str) -> &str {
    const SCHEME: &str = "digest";
    match value.get(..SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SCHEME) => {
            let rest = &value[SCHEME.len()..];
            if rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_whitespace()) {
                rest.trim_start()
            } else {
                value
            }
        }
        _ => value,
    }
}

/// Splits the parameters of a `Digest` header value into `(key, value)`
/// pairs, in order. Commas inside quoted values do not split; quotes are
/// removed and `\x` escapes inside them are resolved.
pub fn parse_auth_params(header: &str) -> Vec<(String, String)> {
    auth_params(strip_scheme(header.trim()))
}

fn auth_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    value.push(escaped);
                }
            }
            ',' if !in_quotes => {
                push_param(&mut params, &mut key, &mut value);
                in_value = false;
            }
            '=' if !in_value => in_value = true,
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }
    push_param(&mut params, &mut key, &mut value);
    params
}

fn push_param(params: &mut Vec<(String, String)>, key: &mut String, value: &mut String) {
    let k = key.trim();
    if !k.is_empty() {
        params.push((k.to_owned(), value.trim().to_owned()));
    }
    key.clear();
    value.clear();
}

fn md5_hex(data: &str) -> String {
    format!("{:x}", md5::compute(data.as_bytes()))
}

/// Computes the RFC 2617 `qop=auth` response digest.
///
/// `HA1 = MD5(user:realm:pass)`, `HA2 = MD5(method:uri)`,
/// `response = MD5(HA1:nonce:nc:cnonce:qop:HA2)`.
pub fn digest_response(
    credentials: &Credentials,
    challenge: &DigestChallenge,
    method: &str,
    uri: &str,
    nc: &str,
    cnonce: &str,
) -> String {
    let ha1 = md5_hex(&format!(
        "{}:{}:{}",
        credentials.username, challenge.realm, credentials.password
    ));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    md5_hex(&format!(
        "{}:{}:{}:{}:{}:{}",
        ha1, challenge.nonce, nc, cnonce, challenge.qop, ha2
    ))
}

/// Client-side digest state for one session.
pub struct DigestClient {
    credentials: Credentials,
    challenge: Option<DigestChallenge>,
    nc: u32,
}

impl DigestClient {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            challenge: None,
            nc: 0,
        }
    }

    pub fn challenge(&self) -> Option<&DigestChallenge> {
        self.challenge.as_ref()
    }

    /// Replaces the current challenge and restarts the nonce count.
    pub fn set_challenge(&mut self, challenge: DigestChallenge) {
        debug!(realm = %challenge.realm, stale = ?challenge.stale, "digest challenge installed");
        self.challenge = Some(challenge);
        self.nc = 0;
    }

    /// Nonce count of the last header produced for the current challenge.
    pub fn nonce_count(&self) -> u32 {
        self.nc
    }

    /// Produces the next `Authorization` value, or `None` before any
    /// challenge has been installed.
    pub fn authorization(&mut self, method: &str, uri: &str) -> Option<String> {
        self.challenge.as_ref()?;
        self.nc = self.nc.wrapping_add(1);
        let nc = format!("{:08x}", self.nc);
        let cnonce: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CNONCE_LEN)
            .map(char::from)
            .collect();
        self.authorization_with(method, uri, &nc, &cnonce)
    }

    /// Deterministic form of [`authorization`](Self::authorization): uses the
    /// given nonce count and client nonce and leaves state untouched.
    pub fn authorization_with(
        &self,
        method: &str,
        uri: &str,
        nc: &str,
        cnonce: &str,
    ) -> Option<String> {
        let challenge = self.challenge.as_ref()?;
        let response = digest_response(&self.credentials, challenge, method, uri, nc, cnonce);

        let mut header = format!(
            "Digest username=\"{}\",realm=\"{}\",nonce=\"{}\",uri=\"{}\",qop=\"{}\",response=\"{}\",nc=\"{}\",cnonce=\"{}\"",
            self.credentials.username,
            challenge.realm,
            challenge.nonce,
            uri,
            challenge.qop,
            response,
            nc,
            cnonce
        );
        if let Some(opaque) = &challenge.opaque {
            header.push_str(&format!(",opaque=\"{}\"", opaque));
        }
        Some(header)
    }
}

/// Frames authenticated `POST /wsman` requests for one endpoint.
pub struct Authenticator {
    endpoint: SessionEndpoint,
    digest: DigestClient,
    framing: BodyFraming,
}

impl Authenticator {
    pub fn new(endpoint: SessionEndpoint, credentials: Credentials, framing: BodyFraming) -> Self {
        Self {
            endpoint,
            digest: DigestClient::new(credentials),
            framing,
        }
    }

    pub fn endpoint(&self) -> &SessionEndpoint {
        &self.endpoint
    }

    pub fn install_challenge(&mut self, challenge: DigestChallenge) {
        self.digest.set_challenge(challenge);
    }

    /// Serializes `body` as a complete request.
    ///
    /// `Authorization` is present only once a challenge is known and always
    /// precedes `Host`. Performs no I/O.
    pub fn build_message(&mut self, body: &str) -> Result<Bytes, AuthError> {
        if body.is_empty() {
            return Err(AuthError::EmptyBody);
        }

        let mut headers = Headers::new();
        if let Some(value) = self.digest.authorization("POST", wsman_core::WSMAN_PATH) {
            headers.push("Authorization", value);
        }
        headers.push("Host", self.endpoint.authority());

        let request = HttpRequest::wsman_post(headers, Bytes::copy_from_slice(body.as_bytes()))?;
        Ok(serialize_request(&request, self.framing))
    }
}
