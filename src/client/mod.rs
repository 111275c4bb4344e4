//! Client for the upstream identity service. It resolves credentials into users, user settings and
//! lists of allowed paths. Every lookup type has its own cache keyed by credential, and concurrent
//! lookups for the same credential share a single upstream request.
//!
//! Lookups never fail loudly: transport errors, non-success status codes and malformed bodies are
//! logged and reported as `None`, and nothing is cached for them.

mod error;

use std::num::NonZeroUsize;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, COOKIE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};
use tracing_futures::Instrument;
use url::Url;

use crate::authn::{Credential, SESSION_COOKIE_NAME};
use crate::cache::{CoalescingCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL, DEFAULT_WAIT_TIMEOUT};
use crate::identity::{AllowedPathList, Identity, UserSettings};

pub use error::ClientError;

/// A shorthand `Result` type that always uses `ClientError` as its error variant
pub type Result<T> = std::result::Result<T, ClientError>;

pub const CURRENT_USER_ENDPOINT: &str = "auth/current-user/";
pub const SETTINGS_ENDPOINT: &str = "auth/current-user/settings/";
pub const VIEWER_PATHS_ENDPOINT: &str = "auth/current-user/viewer-paths/";
pub const ALLOWED_VIEWER_PATHS_ENDPOINT: &str = "auth/current-user/allowed-viewer-paths/";
pub const ALIVE_ENDPOINT: &str = "api/alive/";

/// Default timeout for a single request to the identity service
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Which endpoint lists the paths a user may read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathsEndpoint {
    /// `auth/current-user/viewer-paths/`
    ViewerPaths,
    /// `auth/current-user/allowed-viewer-paths/`, which already includes the project directory
    AllowedViewerPaths,
}

impl PathsEndpoint {
    fn path(&self) -> &'static str {
        match self {
            PathsEndpoint::ViewerPaths => VIEWER_PATHS_ENDPOINT,
            PathsEndpoint::AllowedViewerPaths => ALLOWED_VIEWER_PATHS_ENDPOINT,
        }
    }
}

/// Tunables for the client and its caches
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long a resolved value stays cached
    pub cache_ttl: Duration,
    /// How long a request waits for another request's in-flight lookup
    pub wait_timeout: Duration,
    /// Timeout for every request sent to the identity service
    pub request_timeout: Duration,
    /// How many credentials each cache remembers at most
    pub cache_max_entries: NonZeroUsize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            cache_ttl: DEFAULT_TTL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// The status reported by the identity service's alive endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UpstreamStatus {
    pub alive: bool,
    pub version: Option<String>,
}

/// A client type for resolving credentials against the identity service. Cloning is cheap and all
/// clones share the same caches.
#[derive(Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    base_url: Url,
    users: CoalescingCache<Identity>,
    settings: CoalescingCache<UserSettings>,
    allowed_paths: CoalescingCache<AllowedPathList>,
}

impl IdentityClient {
    /// Returns a new client for the identity service at `base_url`. Any path in the base URL is
    /// kept as a prefix for every endpoint
    pub fn new(base_url: &str, options: ClientOptions) -> Result<Self> {
        let mut base_url: Url = base_url.parse()?;
        // Url::join would otherwise replace the last path segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;

        fn cache<T: Clone>(name: &'static str, options: &ClientOptions) -> CoalescingCache<T> {
            CoalescingCache::new(
                name,
                options.cache_ttl,
                options.wait_timeout,
                options.cache_max_entries,
            )
        }

        Ok(IdentityClient {
            client,
            base_url,
            users: cache("users", &options),
            settings: cache("settings", &options),
            allowed_paths: cache("allowed_paths", &options),
        })
    }

    /// The base URL all endpoints are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves the user the credential belongs to
    #[instrument(level = "trace", skip(self, credential))]
    pub async fn current_user(&self, credential: &Credential) -> Option<Identity> {
        self.users
            .get_or_load(credential.token(), move || async move {
                match self.fetch::<Identity>(CURRENT_USER_ENDPOINT, credential).await {
                    Ok(user) => {
                        trace!(email = %user.email, "Retrieved user");
                        Some(user)
                    }
                    Err(e) => {
                        debug!(error = %e, "Unable to retrieve user from credential");
                        None
                    }
                }
            })
            .await
    }

    /// Fetches the settings of an already resolved user
    #[instrument(level = "trace", skip(self, user, credential), fields(email = %user.email))]
    pub async fn user_settings(
        &self,
        user: &Identity,
        credential: &Credential,
    ) -> Option<UserSettings> {
        self.settings
            .get_or_load(credential.token(), move || async move {
                match self.fetch::<UserSettings>(SETTINGS_ENDPOINT, credential).await {
                    Ok(settings) => {
                        trace!("Retrieved settings");
                        Some(settings)
                    }
                    Err(e) => {
                        debug!(error = %e, "Unable to retrieve settings");
                        None
                    }
                }
            })
            .await
    }

    /// Fetches the list of paths an already resolved user may read
    #[instrument(level = "trace", skip(self, user, credential), fields(email = %user.email))]
    pub async fn allowed_paths(
        &self,
        user: &Identity,
        credential: &Credential,
        endpoint: PathsEndpoint,
    ) -> Option<AllowedPathList> {
        self.allowed_paths
            .get_or_load(credential.token(), move || async move {
                match self
                    .fetch::<AllowedPathList>(endpoint.path(), credential)
                    .await
                {
                    Ok(paths) => {
                        trace!(count = paths.len(), "Retrieved allowed paths");
                        Some(paths)
                    }
                    Err(e) => {
                        debug!(error = %e, "Unable to retrieve allowed paths");
                        None
                    }
                }
            })
            .await
    }

    /// Asks the identity service whether it is alive. This is never cached
    #[instrument(level = "trace", skip(self))]
    pub async fn alive(&self) -> Result<UpstreamStatus> {
        let url = self.base_url.join(ALIVE_ENDPOINT)?;
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(ClientError::UnexpectedStatus(resp.status()));
        }
        Ok(resp.json::<UpstreamStatus>().await?)
    }

    async fn fetch<T: DeserializeOwned>(&self, endpoint: &str, credential: &Credential) -> Result<T> {
        let url = self.base_url.join(endpoint)?;
        let (name, value) = credential_header(credential)?;
        let span = tracing::trace_span!("upstream_request", %url);
        let resp = self
            .client
            .get(url)
            .header(name, value)
            .send()
            .instrument(span)
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus(status));
        }
        Ok(resp.json::<T>().await?)
    }
}

/// Builds the header that forwards the credential the same way it was received
fn credential_header(credential: &Credential) -> Result<(HeaderName, HeaderValue)> {
    let (name, raw) = match credential {
        Credential::SessionCookie(token) => (COOKIE, format!("{}={}", SESSION_COOKIE_NAME, token)),
        Credential::Bearer(token) => (AUTHORIZATION, format!("Bearer {}", token)),
    };
    let mut value = HeaderValue::from_str(&raw)?;
    value.set_sensitive(true);
    Ok((name, value))
}
