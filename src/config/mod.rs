//! Environment-driven configuration.
//!
//! Mirrors the pattern of one `from_env()` per sub-config composed into a
//! single top-level [`Config::from_env()`].

mod cache;
mod credentials;
pub(crate) mod helpers;
mod runner;

pub use cache::CacheConfig;
pub use credentials::LlmCredentialsConfig;
pub use runner::{RateLimitConfig, RunnerConfig};

use crate::error::ConfigError;

/// Top-level configuration for the jobs engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    pub runner: RunnerConfig,
    pub rate_limit: RateLimitConfig,
    pub credentials: LlmCredentialsConfig,
}

impl Config {
    /// Load `.env` (if present, ignoring a missing file) then resolve every
    /// sub-config from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            cache: CacheConfig::from_env()?,
            runner: RunnerConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env()?,
            credentials: LlmCredentialsConfig::from_env()?,
        })
    }
}
