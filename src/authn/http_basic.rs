use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// HTTP header prefix
const HTTP_BASIC_PREFIX: &str = "Basic ";

/// A single fixed username and password pair, only meant for test deployments.
///
/// In basic auth, the header will come in as 'Basic BASE64_STRING', where the Base-64 string is
/// the username and password separated by a colon.
#[derive(Clone, PartialEq, Eq)]
pub struct FixedCredentials {
    pub username: String,
    pub password: String,
}

impl FixedCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        FixedCredentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns true if the given `Authorization` header carries exactly these credentials. Note
    /// that it is considered a security risk to leak any information about why an auth failed, so
    /// the reason is only logged.
    pub fn matches_header(&self, auth_header: &str) -> bool {
        match parse_basic(auth_header) {
            Ok((username, password)) => username == self.username && password == self.password,
            Err(e) => {
                tracing::debug!(error = %e, "Unable to parse Basic header");
                false
            }
        }
    }
}

impl fmt::Debug for FixedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub(crate) fn parse_basic(auth_data: &str) -> anyhow::Result<(String, String)> {
    match auth_data.strip_prefix(HTTP_BASIC_PREFIX) {
        None => anyhow::bail!("Wrong auth type. Only Basic auth is supported"),
        Some(suffix) => {
            // suffix should be base64 string
            let decoded = String::from_utf8(STANDARD.decode(suffix.trim())?)?;
            match decoded.split_once(':') {
                Some((username, password)) => Ok((username.to_owned(), password.to_owned())),
                None => anyhow::bail!("Malformed Basic header"),
            }
        }
    }
}
