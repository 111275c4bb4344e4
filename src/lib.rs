//! A file-serving gateway for Zarr image data. Requests for files under the data root are checked
//! against the configured [authorization scheme](authz::AuthorizationScheme), usually by resolving
//! the caller's credential against an upstream identity service, and then streamed back.

pub mod authn;
pub mod authz;
pub mod cache;
pub mod client;
pub mod config;
pub mod identity;
pub mod path;
pub mod server;

pub use authz::{Authorizer, SchemeAuthorizer};
pub use client::IdentityClient;
pub use config::{Config, ConfigError, RawConfig};

use serde::{Deserialize, Serialize};

/// The body returned by the alive endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AliveResponse {
    pub alive: bool,
    pub version: String,
    pub fractal_server_alive: bool,
    pub fractal_server_version: Option<String>,
}
