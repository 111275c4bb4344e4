//! Records returned by the identity service. All of them are immutable once fetched and are cached
//! per credential by the [`IdentityClient`](crate::client::IdentityClient)

use serde::{Deserialize, Serialize};

/// The user a credential resolves to
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    #[serde(default)]
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub username: Option<String>,
}

/// Per-user settings. Only `project_dir` and `slurm_user` take part in authorization
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct UserSettings {
    pub slurm_user: Option<String>,
    pub project_dir: Option<String>,
    pub cache_dir: Option<String>,
    pub slurm_accounts: Vec<String>,
}

/// Absolute directory paths whose subtrees a user may read
pub type AllowedPathList = Vec<String>;
