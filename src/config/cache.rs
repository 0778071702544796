use std::path::PathBuf;

use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

/// Configuration for [`crate::cache::Cache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Filesystem path for the default on-disk key-value cache.
    /// Env: `EDSL_DATABASE_PATH`. Default: `<platform cache dir>/edsl-jobs/data.db`.
    pub database_path: PathBuf,
    /// Remote cache base URL. Env: `EXPECTED_PARROT_CACHE_URL`.
    pub remote_url: Option<String>,
    /// Bearer token for the remote object store. Env: `EXPECTED_PARROT_API_KEY`.
    pub api_key: Option<SecretString>,
    /// Upload `new_entries` to the remote cache on session exit.
    pub remote_backups: bool,
    /// Commit `store()` writes to `data` immediately rather than deferring
    /// them to session exit.
    pub immediate_write: bool,
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = optional_env("EDSL_DATABASE_PATH")?
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);
        let remote_url = optional_env("EXPECTED_PARROT_CACHE_URL")?;
        let api_key = optional_env("EXPECTED_PARROT_API_KEY")?.map(SecretString::from);
        let remote_backups = parse_optional_env("EDSL_REMOTE_BACKUPS", false)?;

        if remote_backups && remote_url.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "EXPECTED_PARROT_CACHE_URL".to_string(),
            });
        }

        Ok(Self {
            database_path,
            remote_url,
            api_key,
            remote_backups,
            immediate_write: parse_optional_env("EDSL_IMMEDIATE_WRITE", true)?,
        })
    }
}

fn default_database_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("edsl-jobs")
        .join("data.db")
}
