//! An authorizer that accepts a single fixed Basic auth user. Only meant for test deployments

use std::path::{Path, PathBuf};

use tracing::debug;

use super::Authorizer;
use crate::authn::http_basic::FixedCredentials;
use crate::authn::AuthData;
use crate::path::is_subfolder;

#[derive(Debug, Clone)]
pub struct TestingBasicAuthorizer {
    credentials: FixedCredentials,
    data_root: PathBuf,
}

impl TestingBasicAuthorizer {
    pub fn new(credentials: FixedCredentials, data_root: impl Into<PathBuf>) -> Self {
        TestingBasicAuthorizer {
            credentials,
            data_root: data_root.into(),
        }
    }
}

#[async_trait::async_trait]
impl Authorizer for TestingBasicAuthorizer {
    async fn is_user_valid(&self, auth_data: &AuthData) -> bool {
        auth_data.auth_header.is_some()
    }

    async fn is_user_authorized(&self, path: &Path, auth_data: &AuthData) -> bool {
        let header = match auth_data.auth_header.as_deref() {
            Some(h) => h,
            None => return false,
        };
        if !self.credentials.matches_header(header) {
            debug!("Basic credentials do not match the configured user");
            return false;
        }
        is_subfolder(&self.data_root, path)
    }
}
