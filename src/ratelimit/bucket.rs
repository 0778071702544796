use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::BucketError;

/// Poll interval used while waiting for refill. The specification allows
/// any interval ≤100ms or a condition-variable equivalent; this
/// implementation polls (see specification §9 design note on this tradeoff).
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Leaky-bucket rate limiter with refill over monotonic time.
///
/// `0 <= tokens <= capacity` always holds; `tokens` is mutated only via
/// `refill` (folded into `take`) — see specification §4.3.
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Acquire `amount` tokens, waiting as needed. Fails immediately (no
    /// waiting) if `amount` exceeds capacity.
    pub async fn take(&self, amount: f64) -> Result<(), BucketError> {
        if amount > self.capacity {
            return Err(BucketError::wait_exceeds(amount, self.capacity));
        }

        loop {
            {
                let mut state = self.state.lock().await;
                Self::refill(&mut state, self.capacity, self.refill_rate);
                if state.tokens >= amount {
                    state.tokens -= amount;
                    return Ok(());
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Estimate the wait, in seconds, for `amount` tokens, without
    /// acquiring or mutating state. Based on the currently stored token
    /// count (not a fresh refill) — matches the original's pure, unrefilled
    /// estimate.
    pub async fn wait_time(&self, amount: f64) -> f64 {
        let state = self.state.lock().await;
        ((amount - state.tokens).max(0.0)) / self.refill_rate
    }

    /// Current token count, after a refill. Exposed for tests/diagnostics.
    pub async fn current_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        Self::refill(&mut state, self.capacity, self.refill_rate);
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    fn refill(state: &mut BucketState, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * refill_rate).min(capacity);
        state.last_refill = now;
    }
}
