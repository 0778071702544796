use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::RateLimitConfig;
use crate::ratelimit::bucket::TokenBucket;

/// Per-model pair of (requests bucket, tokens bucket), lazily created and
/// shared across all concurrent interviews for that model.
pub struct ModelBuckets {
    pub requests: Arc<TokenBucket>,
    pub tokens: Arc<TokenBucket>,
}

/// Advertised or fallback rate limits for a model.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub rpm: u32,
    pub tpm: u32,
}

/// Holds a [`ModelBuckets`] per model name. Creation is lazy and idempotent:
/// the first caller to ask for a model's buckets creates them; subsequent
/// callers get the same instances.
pub struct BucketCollection {
    fallback: RateLimitConfig,
    buckets: Mutex<HashMap<String, Arc<ModelBuckets>>>,
}

impl BucketCollection {
    pub fn new(fallback: RateLimitConfig) -> Self {
        Self {
            fallback,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Get or lazily create the buckets for `model`, using `limits` if the
    /// model has not been seen before (e.g. from the adapter's advertised
    /// `rate_limits()`), falling back to the collection's configured
    /// defaults when `limits` is `None`.
    pub async fn get_or_create(
        &self,
        model: &str,
        limits: Option<RateLimits>,
    ) -> Arc<ModelBuckets> {
        let mut buckets = self.buckets.lock().await;
        if let Some(existing) = buckets.get(model) {
            return existing.clone();
        }

        let limits = limits.unwrap_or(RateLimits {
            rpm: self.fallback.default_rpm,
            tpm: self.fallback.default_tpm,
        });

        let burst = self.fallback.burst_factor;
        let requests_capacity = (limits.rpm as f64 / 60.0) * burst;
        let requests_refill = limits.rpm as f64 / 60.0;
        let tokens_capacity = (limits.tpm as f64 / 60.0) * burst;
        let tokens_refill = limits.tpm as f64 / 60.0;

        let created = Arc::new(ModelBuckets {
            requests: Arc::new(TokenBucket::new(requests_capacity, requests_refill)),
            tokens: Arc::new(TokenBucket::new(tokens_capacity, tokens_refill)),
        });
        buckets.insert(model.to_string(), created.clone());
        created
    }
}
