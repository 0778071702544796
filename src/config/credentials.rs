use secrecy::SecretString;

use crate::config::helpers::optional_env;
use crate::error::ConfigError;

/// Credentials for the concrete LM adapters. The core never reads these
/// values; they are carried here only so a complete `Config::from_env()`
/// enumerates every environment variable the specification names.
#[derive(Debug, Clone, Default)]
pub struct LlmCredentialsConfig {
    pub openai_api_key: Option<SecretString>,
    pub anthropic_api_key: Option<SecretString>,
    pub deep_infra_api_key: Option<SecretString>,
}

impl LlmCredentialsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            openai_api_key: optional_env("OPENAI_API_KEY")?.map(SecretString::from),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY")?.map(SecretString::from),
            deep_infra_api_key: optional_env("DEEP_INFRA_API_KEY")?.map(SecretString::from),
        })
    }
}
