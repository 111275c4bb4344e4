//! An authorizer that asks the identity service for the list of paths a user may read. Depending
//! on the endpoint, the user's project directory is added in front of that list. The project
//! directory is checked before the list is even fetched.

use std::path::Path;

use tracing::{instrument, trace};

use super::{resolve_user, Authorizer};
use crate::authn::AuthData;
use crate::client::{IdentityClient, PathsEndpoint};
use crate::path::is_subfolder;

#[derive(Clone)]
pub struct ViewerPathsAuthorizer {
    client: IdentityClient,
    endpoint: PathsEndpoint,
    include_project_dir: bool,
}

impl ViewerPathsAuthorizer {
    /// Creates an authorizer that reads the allowed paths from `endpoint`. When
    /// `include_project_dir` is set, the user's project directory is allowed as well
    pub fn new(client: IdentityClient, endpoint: PathsEndpoint, include_project_dir: bool) -> Self {
        ViewerPathsAuthorizer {
            client,
            endpoint,
            include_project_dir,
        }
    }
}

#[async_trait::async_trait]
impl Authorizer for ViewerPathsAuthorizer {
    async fn is_user_valid(&self, auth_data: &AuthData) -> bool {
        resolve_user(&self.client, auth_data).await.is_some()
    }

    #[instrument(level = "trace", skip(self, auth_data), fields(path = %path.display()))]
    async fn is_user_authorized(&self, path: &Path, auth_data: &AuthData) -> bool {
        let (credential, user) = match resolve_user(&self.client, auth_data).await {
            Some(resolved) => resolved,
            None => return false,
        };

        if self.include_project_dir {
            let project_dir = self
                .client
                .user_settings(&user, &credential)
                .await
                .and_then(|s| s.project_dir);
            if let Some(project_dir) = project_dir {
                if is_subfolder(&project_dir, path) {
                    trace!("Path is inside the project directory");
                    return true;
                }
            }
        }

        let allowed_paths = match self
            .client
            .allowed_paths(&user, &credential, self.endpoint)
            .await
        {
            Some(p) => p,
            None => return false,
        };
        if allowed_paths
            .iter()
            .any(|allowed| is_subfolder(allowed, path))
        {
            return true;
        }
        trace!("Unauthorized path");
        false
    }
}
