//! An authorizer that gives every user access to their own folder under the data root, named after
//! their SLURM user, plus their project directory.
//!
//! The project directory is always checked first, so an explicit project directory grant wins over
//! the folder derived from the SLURM user.

use std::path::{Component, Path, PathBuf};

use tracing::{instrument, trace, warn};

use super::{resolve_user, Authorizer};
use crate::authn::AuthData;
use crate::client::IdentityClient;
use crate::path::is_subfolder;

#[derive(Clone)]
pub struct UserFoldersAuthorizer {
    client: IdentityClient,
    data_root: PathBuf,
}

impl UserFoldersAuthorizer {
    pub fn new(client: IdentityClient, data_root: impl Into<PathBuf>) -> Self {
        UserFoldersAuthorizer {
            client,
            data_root: data_root.into(),
        }
    }
}

#[async_trait::async_trait]
impl Authorizer for UserFoldersAuthorizer {
    async fn is_user_valid(&self, auth_data: &AuthData) -> bool {
        resolve_user(&self.client, auth_data).await.is_some()
    }

    #[instrument(level = "trace", skip(self, auth_data), fields(path = %path.display()))]
    async fn is_user_authorized(&self, path: &Path, auth_data: &AuthData) -> bool {
        let (credential, user) = match resolve_user(&self.client, auth_data).await {
            Some(resolved) => resolved,
            None => return false,
        };
        let settings = match self.client.user_settings(&user, &credential).await {
            Some(s) => s,
            None => return false,
        };

        if let Some(project_dir) = settings.project_dir.as_deref() {
            if is_subfolder(project_dir, path) {
                trace!("Path is inside the project directory");
                return true;
            }
        }

        let slurm_user = match settings.slurm_user.as_deref() {
            Some(u) if !u.is_empty() => u,
            _ => {
                warn!(email = %user.email, "Slurm user is not defined");
                return false;
            }
        };
        // The folder name must be a single plain segment, "." or ".." would widen the grant
        if !matches!(
            Path::new(slurm_user).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        ) {
            warn!(email = %user.email, %slurm_user, "Slurm user is not a valid folder name");
            return false;
        }

        is_subfolder(self.data_root.join(slurm_user), path)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::authz::test::cookie_request;
    use crate::client::ClientOptions;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with(settings: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/current-user/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "a@x.com"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/current-user/settings/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(settings))
            .mount(&server)
            .await;
        server
    }

    fn authorizer(server: &MockServer) -> UserFoldersAuthorizer {
        let client = IdentityClient::new(&server.uri(), ClientOptions::default())
            .expect("client should build");
        UserFoldersAuthorizer::new(client, "/data")
    }

    #[tokio::test]
    async fn test_slurm_user_folder() {
        let server = server_with(json!({"slurm_user": "alice", "project_dir": null})).await;
        let authorizer = authorizer(&server);
        let request = cookie_request("token-1");

        assert!(authorizer.is_user_valid(&request).await);
        assert!(
            authorizer
                .is_user_authorized(Path::new("/data/alice/img.zarr"), &request)
                .await
        );
        assert!(
            !authorizer
                .is_user_authorized(Path::new("/data/bob/img.zarr"), &request)
                .await
        );
        assert!(
            !authorizer
                .is_user_authorized(Path::new("/data/alice/../bob"), &request)
                .await
        );
    }

    #[tokio::test]
    async fn test_project_dir() {
        let server = server_with(json!({
            "slurm_user": "alice",
            "project_dir": "/projects/p1"
        }))
        .await;
        let authorizer = authorizer(&server);
        let request = cookie_request("token-1");

        assert!(
            authorizer
                .is_user_authorized(Path::new("/projects/p1/plate.zarr"), &request)
                .await
        );
        assert!(
            authorizer
                .is_user_authorized(Path::new("/data/alice/img.zarr"), &request)
                .await
        );
        assert!(
            !authorizer
                .is_user_authorized(Path::new("/projects/p2/plate.zarr"), &request)
                .await
        );
    }

    #[tokio::test]
    async fn test_missing_slurm_user() {
        let server = server_with(json!({"project_dir": "/projects/p1"})).await;
        let authorizer = authorizer(&server);
        let request = cookie_request("token-1");

        assert!(
            authorizer
                .is_user_authorized(Path::new("/projects/p1/plate.zarr"), &request)
                .await,
            "project dir grants access even without a slurm user"
        );
        assert!(
            !authorizer
                .is_user_authorized(Path::new("/data/alice/img.zarr"), &request)
                .await
        );
    }

    #[tokio::test]
    async fn test_slurm_user_must_be_a_plain_name() {
        for slurm_user in ["..", ".", "alice/../..", "/etc"] {
            let server = server_with(json!({ "slurm_user": slurm_user })).await;
            let authorizer = authorizer(&server);
            assert!(
                !authorizer
                    .is_user_authorized(Path::new("/data/bob/img.zarr"), &cookie_request("t"))
                    .await,
                "slurm user {:?} should not grant access",
                slurm_user
            );
        }
    }

    #[tokio::test]
    async fn test_anonymous() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let authorizer = authorizer(&server);
        assert!(!authorizer.is_user_valid(&AuthData::default()).await);
        assert!(
            !authorizer
                .is_user_authorized(Path::new("/data/alice"), &AuthData::default())
                .await
        );
    }

    #[tokio::test]
    async fn test_settings_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/current-user/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "a@x.com"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/current-user/settings/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let authorizer = authorizer(&server);
        let request = cookie_request("token-1");
        assert!(authorizer.is_user_valid(&request).await);
        assert!(
            !authorizer
                .is_user_authorized(Path::new("/data/alice/img.zarr"), &request)
                .await
        );
    }
}
