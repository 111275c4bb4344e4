//! Types for extracting caller credentials from a request. Nothing in here talks to the identity
//! service, it only decides which credential (if any) a request carries

pub mod http_basic;

use std::fmt;

/// Name of the session cookie set by the identity service
pub const SESSION_COOKIE_NAME: &str = "fastapiusersauth";

const BEARER_PREFIX: &str = "bearer ";

/// The raw authentication-related headers of a request
#[derive(Clone, Default)]
pub struct AuthData {
    /// The value of the `Authorization` header
    pub auth_header: Option<String>,
    /// The value of the `Cookie` header
    pub cookie_header: Option<String>,
}

impl AuthData {
    /// Returns the credential carried by the request. A session cookie takes precedence over a
    /// bearer token when both are present.
    pub fn credential(&self) -> Option<Credential> {
        if let Some(token) = self.cookie_header.as_deref().and_then(session_token) {
            return Some(Credential::SessionCookie(token));
        }
        self.auth_header
            .as_deref()
            .and_then(bearer_token)
            .map(Credential::Bearer)
    }
}

impl fmt::Debug for AuthData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthData")
            .field("auth_header", &self.auth_header.as_ref().map(|_| "<redacted>"))
            .field("cookie_header", &self.cookie_header.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An opaque caller credential. The token is compared by exact string match and is forwarded to
/// the identity service the same way it arrived
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Credential {
    /// Token taken from the session cookie
    SessionCookie(String),
    /// Token taken from an `Authorization: Bearer` header
    Bearer(String),
}

impl Credential {
    /// The bare token, used as the cache key for everything resolved from this credential
    pub fn token(&self) -> &str {
        match self {
            Credential::SessionCookie(t) | Credential::Bearer(t) => t,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::SessionCookie(_) => write!(f, "SessionCookie(<redacted>)"),
            Credential::Bearer(_) => write!(f, "Bearer(<redacted>)"),
        }
    }
}

fn session_token(cookie_header: &str) -> Option<String> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_owned())
        .filter(|token| !token.is_empty())
}

fn bearer_token(auth_header: &str) -> Option<String> {
    let header = auth_header.trim_start();
    // The scheme name is case insensitive
    if header.len() < BEARER_PREFIX.len()
        || !header.is_char_boundary(BEARER_PREFIX.len())
        || !header[..BEARER_PREFIX.len()].eq_ignore_ascii_case(BEARER_PREFIX)
    {
        return None;
    }
    let token = header[BEARER_PREFIX.len()..].trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_owned())
    }
}
