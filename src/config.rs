//! Runtime configuration. Settings arrive as a [`RawConfig`](RawConfig), where everything is
//! optional, from the command line, the environment or a TOML file, and are checked once at
//! startup by [`RawConfig::validate`](RawConfig::validate)

use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::authn::http_basic::FixedCredentials;
use crate::authz::AuthorizationScheme;
use crate::client::ClientOptions;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_BASE_PATH: &str = "/vizarr";
pub const DEFAULT_CACHE_EXPIRATION_SECS: u64 = 60;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CACHE_WAIT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// Describes why a configuration is unusable
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required setting was not given. Contains the environment variable name of the setting
    #[error("Missing required setting {0}")]
    MissingValue(&'static str),
    /// The authorization scheme is not one of the supported names
    #[error("Invalid authorization scheme {0:?}, allowed values: {}", AuthorizationScheme::NAMES.join(", "))]
    InvalidScheme(String),
    /// The identity service URL does not parse
    #[error("Invalid URL {value:?}: {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    /// The listen address does not parse
    #[error("Invalid bind address {0:?}")]
    InvalidAddress(String),
    /// The data root must be absolute for containment checks to mean anything
    #[error("ZARR_DATA_BASE_PATH must be an absolute path, got {0:?}")]
    RelativeDataPath(PathBuf),
    /// A timeout or TTL of zero was given
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    /// A cache that cannot hold a single entry was asked for
    #[error("CACHE_MAX_ENTRIES must be greater than zero")]
    ZeroCacheSize,
}

/// Unvalidated settings. Every field is optional so that several sources can be layered with
/// [`or`](RawConfig::or) before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub fractal_server_url: Option<String>,
    pub base_path: Option<String>,
    pub vizarr_static_files_path: Option<PathBuf>,
    pub authorization_scheme: Option<String>,
    pub zarr_data_base_path: Option<PathBuf>,
    pub testing_username: Option<String>,
    pub testing_password: Option<String>,
    pub cache_expiration_time: Option<u64>,
    pub upstream_timeout: Option<u64>,
    pub cache_wait_timeout: Option<u64>,
    pub cache_max_entries: Option<usize>,
}

impl RawConfig {
    /// Fills every unset field from `fallback`
    pub fn or(self, fallback: RawConfig) -> RawConfig {
        RawConfig {
            port: self.port.or(fallback.port),
            bind_address: self.bind_address.or(fallback.bind_address),
            fractal_server_url: self.fractal_server_url.or(fallback.fractal_server_url),
            base_path: self.base_path.or(fallback.base_path),
            vizarr_static_files_path: self
                .vizarr_static_files_path
                .or(fallback.vizarr_static_files_path),
            authorization_scheme: self.authorization_scheme.or(fallback.authorization_scheme),
            zarr_data_base_path: self.zarr_data_base_path.or(fallback.zarr_data_base_path),
            testing_username: self.testing_username.or(fallback.testing_username),
            testing_password: self.testing_password.or(fallback.testing_password),
            cache_expiration_time: self.cache_expiration_time.or(fallback.cache_expiration_time),
            upstream_timeout: self.upstream_timeout.or(fallback.upstream_timeout),
            cache_wait_timeout: self.cache_wait_timeout.or(fallback.cache_wait_timeout),
            cache_max_entries: self.cache_max_entries.or(fallback.cache_max_entries),
        }
    }

    /// Checks the settings and applies defaults
    pub fn validate(self) -> Result<Config, ConfigError> {
        let fractal_server_url = required(self.fractal_server_url, "FRACTAL_SERVER_URL")?;
        let fractal_server_url =
            Url::parse(&fractal_server_url).map_err(|source| ConfigError::InvalidUrl {
                value: fractal_server_url.clone(),
                source,
            })?;
        let vizarr_static_files_path =
            required(self.vizarr_static_files_path, "VIZARR_STATIC_FILES_PATH")?;
        let authorization_scheme: AuthorizationScheme =
            required(self.authorization_scheme, "AUTHORIZATION_SCHEME")?.parse()?;

        let zarr_data_base_path = self.zarr_data_base_path;
        match &zarr_data_base_path {
            Some(p) if !p.is_absolute() => return Err(ConfigError::RelativeDataPath(p.clone())),
            None if authorization_scheme.requires_data_root() => {
                return Err(ConfigError::MissingValue("ZARR_DATA_BASE_PATH"))
            }
            _ => {}
        }

        let testing_credentials = if authorization_scheme == AuthorizationScheme::TestingBasicAuth
        {
            Some(FixedCredentials::new(
                required(self.testing_username, "TESTING_USERNAME")?,
                required(self.testing_password, "TESTING_PASSWORD")?,
            ))
        } else {
            None
        };

        let bind_address = self
            .bind_address
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_owned());
        let bind_address: IpAddr = bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(bind_address.clone()))?;

        Ok(Config {
            port: self.port.unwrap_or(DEFAULT_PORT),
            bind_address,
            fractal_server_url,
            base_path: normalize_base_path(self.base_path.as_deref().unwrap_or(DEFAULT_BASE_PATH)),
            vizarr_static_files_path,
            authorization_scheme,
            zarr_data_base_path,
            testing_credentials,
            cache_expiration_time: seconds(
                self.cache_expiration_time,
                DEFAULT_CACHE_EXPIRATION_SECS,
                "CACHE_EXPIRATION_TIME",
            )?,
            upstream_timeout: seconds(
                self.upstream_timeout,
                DEFAULT_UPSTREAM_TIMEOUT_SECS,
                "UPSTREAM_TIMEOUT",
            )?,
            cache_wait_timeout: seconds(
                self.cache_wait_timeout,
                DEFAULT_CACHE_WAIT_TIMEOUT_SECS,
                "CACHE_WAIT_TIMEOUT",
            )?,
            cache_max_entries: NonZeroUsize::new(
                self.cache_max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES),
            )
            .ok_or(ConfigError::ZeroCacheSize)?,
        })
    }
}

/// Validated settings
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_address: IpAddr,
    pub fractal_server_url: Url,
    /// Always starts and ends with a `/`
    pub base_path: String,
    pub vizarr_static_files_path: PathBuf,
    pub authorization_scheme: AuthorizationScheme,
    pub zarr_data_base_path: Option<PathBuf>,
    pub testing_credentials: Option<FixedCredentials>,
    pub cache_expiration_time: Duration,
    pub upstream_timeout: Duration,
    pub cache_wait_timeout: Duration,
    pub cache_max_entries: NonZeroUsize,
}

impl Config {
    /// Options for the identity service client derived from these settings
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            cache_ttl: self.cache_expiration_time,
            wait_timeout: self.cache_wait_timeout,
            request_timeout: self.upstream_timeout,
            cache_max_entries: self.cache_max_entries,
        }
    }

    /// Logs every setting at debug level. Passwords are never logged
    pub fn log_settings(&self) {
        debug!("PORT: {}", self.port);
        debug!("BIND_ADDRESS: {}", self.bind_address);
        debug!("FRACTAL_SERVER_URL: {}", self.fractal_server_url);
        debug!("BASE_PATH: {}", self.base_path);
        debug!(
            "VIZARR_STATIC_FILES_PATH: {}",
            self.vizarr_static_files_path.display()
        );
        debug!("AUTHORIZATION_SCHEME: {}", self.authorization_scheme);
        if let Some(p) = &self.zarr_data_base_path {
            debug!("ZARR_DATA_BASE_PATH: {}", p.display());
        }
        if let Some(c) = &self.testing_credentials {
            debug!("TESTING_USERNAME: {}", c.username);
        }
        debug!(
            "CACHE_EXPIRATION_TIME: {}",
            self.cache_expiration_time.as_secs()
        );
        debug!("UPSTREAM_TIMEOUT: {}", self.upstream_timeout.as_secs());
        debug!("CACHE_WAIT_TIMEOUT: {}", self.cache_wait_timeout.as_secs());
        debug!("CACHE_MAX_ENTRIES: {}", self.cache_max_entries);
    }
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::MissingValue(name))
}

fn seconds(value: Option<u64>, default: u64, name: &'static str) -> Result<Duration, ConfigError> {
    match value.unwrap_or(default) {
        0 => Err(ConfigError::ZeroDuration(name)),
        secs => Ok(Duration::from_secs(secs)),
    }
}

/// Makes sure the base path starts and ends with a single `/`
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{}/", trimmed)
    }
}
