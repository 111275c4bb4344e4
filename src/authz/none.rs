//! An authorizer that lets every request through, for deployments without any authorization
//! boundary or for development environments. Reads are still confined to the data root by the
//! path validator

use std::path::Path;

use super::Authorizer;
use crate::authn::AuthData;

/// An authorizer that always returns success
#[derive(Debug, Clone)]
pub struct NoneAuthorizer;

#[async_trait::async_trait]
impl Authorizer for NoneAuthorizer {
    async fn is_user_valid(&self, _: &AuthData) -> bool {
        true
    }

    async fn is_user_authorized(&self, _: &Path, _: &AuthData) -> bool {
        true
    }
}
