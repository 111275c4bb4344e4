//! Types and traits for use in authorization. A deployment picks exactly one
//! [`AuthorizationScheme`](AuthorizationScheme) at startup, which is turned into a
//! [`SchemeAuthorizer`](SchemeAuthorizer) that is then passed to the request handlers

pub mod none;
pub mod testing_basic;
pub mod user_folders;
pub mod viewer_paths;

use std::fmt::{self, Display};
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::authn::{AuthData, Credential};
use crate::client::{IdentityClient, PathsEndpoint};
use crate::config::{Config, ConfigError};
use crate::identity::Identity;

pub use none::NoneAuthorizer;
pub use testing_basic::TestingBasicAuthorizer;
pub use user_folders::UserFoldersAuthorizer;
pub use viewer_paths::ViewerPathsAuthorizer;

/// The supported authorization schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationScheme {
    /// Everybody may read everything under the data root
    None,
    /// A single fixed Basic auth user may read everything under the data root
    TestingBasicAuth,
    /// Users may read their project directory and `{data root}/{slurm user}`
    UserFolders,
    /// Users may read their project directory and the paths listed by `viewer-paths`
    FractalServerViewerPaths,
    /// Users may read the paths listed by `allowed-viewer-paths`
    FractalServer,
}

impl AuthorizationScheme {
    /// Every accepted scheme name
    pub const NAMES: &'static [&'static str] = &[
        "none",
        "testing-basic-auth",
        "user-folders",
        "fractal-server-viewer-paths",
        "fractal-server",
    ];

    /// Whether the scheme needs a fixed data root to work
    pub fn requires_data_root(&self) -> bool {
        matches!(
            self,
            AuthorizationScheme::None
                | AuthorizationScheme::TestingBasicAuth
                | AuthorizationScheme::UserFolders
        )
    }
}

impl Display for AuthorizationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthorizationScheme::None => "none",
            AuthorizationScheme::TestingBasicAuth => "testing-basic-auth",
            AuthorizationScheme::UserFolders => "user-folders",
            AuthorizationScheme::FractalServerViewerPaths => "fractal-server-viewer-paths",
            AuthorizationScheme::FractalServer => "fractal-server",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for AuthorizationScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" => Ok(AuthorizationScheme::None),
            "testing-basic-auth" => Ok(AuthorizationScheme::TestingBasicAuth),
            "user-folders" => Ok(AuthorizationScheme::UserFolders),
            "fractal-server-viewer-paths" => Ok(AuthorizationScheme::FractalServerViewerPaths),
            "fractal-server" => Ok(AuthorizationScheme::FractalServer),
            other => Err(ConfigError::InvalidScheme(other.to_owned())),
        }
    }
}

/// A trait for any system that can decide whether a request may read a file
#[async_trait::async_trait]
pub trait Authorizer {
    /// Returns true if the request comes from a valid user
    async fn is_user_valid(&self, auth_data: &AuthData) -> bool;

    /// Returns true if the user behind the request may read the given (already validated and
    /// normalized) path
    async fn is_user_authorized(&self, path: &Path, auth_data: &AuthData) -> bool;
}

/// The authorizer selected by configuration
#[derive(Clone)]
pub enum SchemeAuthorizer {
    None(NoneAuthorizer),
    TestingBasicAuth(TestingBasicAuthorizer),
    UserFolders(UserFoldersAuthorizer),
    ViewerPaths(ViewerPathsAuthorizer),
}

impl SchemeAuthorizer {
    /// Builds the authorizer for the configured scheme. The client is only used by schemes that
    /// consult the identity service
    pub fn from_config(config: &Config, client: IdentityClient) -> Result<Self, ConfigError> {
        let data_root = || {
            config
                .zarr_data_base_path
                .clone()
                .ok_or(ConfigError::MissingValue("ZARR_DATA_BASE_PATH"))
        };
        let authorizer = match config.authorization_scheme {
            AuthorizationScheme::None => {
                warn!("Authorization scheme is set to \"none\": everybody will be able to access the files. Do not use in production!");
                SchemeAuthorizer::None(NoneAuthorizer)
            }
            AuthorizationScheme::TestingBasicAuth => {
                warn!("Authorization scheme is set to \"testing-basic-auth\". Do not use in production!");
                let credentials = config
                    .testing_credentials
                    .clone()
                    .ok_or(ConfigError::MissingValue("TESTING_USERNAME"))?;
                SchemeAuthorizer::TestingBasicAuth(TestingBasicAuthorizer::new(
                    credentials,
                    data_root()?,
                ))
            }
            AuthorizationScheme::UserFolders => {
                SchemeAuthorizer::UserFolders(UserFoldersAuthorizer::new(client, data_root()?))
            }
            AuthorizationScheme::FractalServerViewerPaths => SchemeAuthorizer::ViewerPaths(
                ViewerPathsAuthorizer::new(client, PathsEndpoint::ViewerPaths, true),
            ),
            AuthorizationScheme::FractalServer => SchemeAuthorizer::ViewerPaths(
                ViewerPathsAuthorizer::new(client, PathsEndpoint::AllowedViewerPaths, false),
            ),
        };
        Ok(authorizer)
    }
}

#[async_trait::async_trait]
impl Authorizer for SchemeAuthorizer {
    async fn is_user_valid(&self, auth_data: &AuthData) -> bool {
        match self {
            SchemeAuthorizer::None(a) => a.is_user_valid(auth_data).await,
            SchemeAuthorizer::TestingBasicAuth(a) => a.is_user_valid(auth_data).await,
            SchemeAuthorizer::UserFolders(a) => a.is_user_valid(auth_data).await,
            SchemeAuthorizer::ViewerPaths(a) => a.is_user_valid(auth_data).await,
        }
    }

    async fn is_user_authorized(&self, path: &Path, auth_data: &AuthData) -> bool {
        match self {
            SchemeAuthorizer::None(a) => a.is_user_authorized(path, auth_data).await,
            SchemeAuthorizer::TestingBasicAuth(a) => a.is_user_authorized(path, auth_data).await,
            SchemeAuthorizer::UserFolders(a) => a.is_user_authorized(path, auth_data).await,
            SchemeAuthorizer::ViewerPaths(a) => a.is_user_authorized(path, auth_data).await,
        }
    }
}

/// Resolves the credential and user behind a request, if any
pub(crate) async fn resolve_user(
    client: &IdentityClient,
    auth_data: &AuthData,
) -> Option<(Credential, Identity)> {
    let credential = match auth_data.credential() {
        Some(c) => c,
        None => {
            debug!("Missing cookie or token header");
            return None;
        }
    };
    let user = client.current_user(&credential).await?;
    Some((credential, user))
}
