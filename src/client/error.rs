use thiserror::Error;

/// Describes the various errors that can occur while talking to the identity service
#[derive(Error, Debug)]
pub enum ClientError {
    /// Indicates that the given URL is invalid, contains the underlying parsing error
    #[error("Invalid URL given: {0:?}")]
    InvalidURL(#[from] url::ParseError),
    /// The credential cannot be sent as an HTTP header value
    #[error("Credential contains characters that are not allowed in a header")]
    InvalidCredential(#[from] reqwest::header::InvalidHeaderValue),
    /// There was a problem with the http client, the connection or the response body. Contains the
    /// underlying error
    #[error("Error performing request: {0:?}")]
    HttpClientError(#[from] reqwest::Error),
    /// The identity service answered with a non-success status code
    #[error("Identity service replied with status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
}
