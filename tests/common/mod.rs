#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use vizarr_gate::authn::AuthData;
use vizarr_gate::config::{Config, RawConfig};
use vizarr_gate::Authorizer;

pub const IMAGE_BYTES: &[u8] = b"\x93NUMPY chunk data \x00\x01\x02";
pub const INDEX_HTML: &str = "<html><body>vizarr</body></html>";

/// A scratch directory laid out like a small deployment:
///
/// ```text
/// {tmp}/secret.txt                  outside the data root
/// {tmp}/data/alice/img.zarr/0/0     a chunk in alice's folder
/// {tmp}/data/bob/img.zarr/0/0       a chunk in bob's folder
/// {tmp}/data/foo#bar                a file name that needs percent-encoding
/// {tmp}/static/index.html           the viewer bundle
/// ```
pub struct TestEnv {
    pub data_root: PathBuf,
    pub static_dir: PathBuf,
    // Keep a handle to the tempdir so it doesn't drop until the environment drops
    _tempdir: TempDir,
}

impl TestEnv {
    pub fn new() -> TestEnv {
        let tempdir = tempfile::tempdir().expect("unable to create tempdir");
        let data_root = tempdir.path().join("data");
        let static_dir = tempdir.path().join("static");

        for user in ["alice", "bob"] {
            let chunk_dir = data_root.join(user).join("img.zarr").join("0");
            std::fs::create_dir_all(&chunk_dir).expect("unable to create data dir");
            std::fs::write(chunk_dir.join("0"), IMAGE_BYTES).expect("unable to write chunk");
        }
        std::fs::write(data_root.join("foo#bar"), b"hash").expect("unable to write file");
        std::fs::write(tempdir.path().join("secret.txt"), b"secret").expect("unable to write file");
        std::fs::create_dir_all(&static_dir).expect("unable to create static dir");
        std::fs::write(static_dir.join("index.html"), INDEX_HTML).expect("unable to write index");

        TestEnv {
            data_root,
            static_dir,
            _tempdir: tempdir,
        }
    }

    /// Settings for the given scheme pointing at this environment and at the given identity
    /// service
    pub fn raw_config(&self, scheme: &str, fractal_server_url: &str) -> RawConfig {
        RawConfig {
            fractal_server_url: Some(fractal_server_url.to_owned()),
            vizarr_static_files_path: Some(self.static_dir.clone()),
            authorization_scheme: Some(scheme.to_owned()),
            zarr_data_base_path: Some(self.data_root.clone()),
            testing_username: Some("test".to_owned()),
            testing_password: Some("password".to_owned()),
            ..Default::default()
        }
    }

    pub fn config(&self, scheme: &str, fractal_server_url: &str) -> Config {
        self.raw_config(scheme, fractal_server_url)
            .validate()
            .expect("config should be valid")
    }

    /// The URL path under which `relative` (relative to the data root) is served
    pub fn data_url(&self, relative: &str) -> String {
        format!("/vizarr/data/{}", relative)
    }
}

/// An authorizer with a fixed answer that counts how often it was consulted
#[derive(Clone)]
pub struct StaticAuthorizer {
    valid: bool,
    allowed_prefix: Option<PathBuf>,
    pub validity_checks: Arc<AtomicUsize>,
    pub authorization_checks: Arc<AtomicUsize>,
}

impl StaticAuthorizer {
    /// Every user is valid and may read everything under `prefix`
    pub fn allowing(prefix: impl AsRef<Path>) -> Self {
        StaticAuthorizer {
            valid: true,
            allowed_prefix: Some(prefix.as_ref().to_owned()),
            validity_checks: Default::default(),
            authorization_checks: Default::default(),
        }
    }

    /// Every user is valid, nobody may read anything
    pub fn denying() -> Self {
        StaticAuthorizer {
            valid: true,
            allowed_prefix: None,
            validity_checks: Default::default(),
            authorization_checks: Default::default(),
        }
    }

    /// No user is valid
    pub fn rejecting() -> Self {
        StaticAuthorizer {
            valid: false,
            allowed_prefix: None,
            validity_checks: Default::default(),
            authorization_checks: Default::default(),
        }
    }

    pub fn authorization_calls(&self) -> usize {
        self.authorization_checks.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Authorizer for StaticAuthorizer {
    async fn is_user_valid(&self, _auth_data: &AuthData) -> bool {
        self.validity_checks.fetch_add(1, Ordering::SeqCst);
        self.valid
    }

    async fn is_user_authorized(&self, path: &Path, _auth_data: &AuthData) -> bool {
        self.authorization_checks.fetch_add(1, Ordering::SeqCst);
        match &self.allowed_prefix {
            Some(prefix) => path.starts_with(prefix),
            None => false,
        }
    }
}
