use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

/// Configuration for [`crate::runner::JobsRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How many times to run each interview.
    pub n: usize,
    /// If true, the first interview failure cancels all peers and
    /// propagates instead of being collected into the `TaskHistory`.
    pub stop_on_exception: bool,
    /// Render a live progress table while running.
    pub progress_bar: bool,
    /// An optional cheap/fast model used for lightweight sidecar tasks
    /// (e.g. answer-quality triage). The core never calls this itself;
    /// it is threaded through for collaborators that do.
    pub sidecar_model: Option<String>,
    /// Per-LM-call timeout in seconds. Exceeding it is treated as a
    /// transient failure, retried with the same backoff as any other
    /// transient adapter error.
    pub call_timeout_secs: u64,
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            n: parse_optional_env("EDSL_RUNNER_N", 1usize)?,
            stop_on_exception: parse_optional_env("EDSL_STOP_ON_EXCEPTION", false)?,
            progress_bar: parse_optional_env("EDSL_PROGRESS_BAR", true)?,
            sidecar_model: optional_env("EDSL_SIDECAR_MODEL")?,
            call_timeout_secs: parse_optional_env("EDSL_CALL_TIMEOUT_SECS", 120u64)?,
        })
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            n: 1,
            stop_on_exception: false,
            progress_bar: true,
            sidecar_model: None,
            call_timeout_secs: 120,
        }
    }
}

/// Fallback rate-limit configuration used by [`crate::ratelimit::BucketCollection`]
/// when a model's adapter does not advertise its own `rate_limits()`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub default_rpm: u32,
    pub default_tpm: u32,
    pub burst_factor: f64,
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            default_rpm: parse_optional_env("EDSL_DEFAULT_RPM", 10_000u32)?,
            default_tpm: parse_optional_env("EDSL_DEFAULT_TPM", 2_000_000u32)?,
            burst_factor: parse_optional_env("EDSL_BURST_FACTOR", 1.0f64)?,
        })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_rpm: 10_000,
            default_tpm: 2_000_000,
            burst_factor: 1.0,
        }
    }
}
