//! Token-bucket rate limiter bounding outbound exchange calls. Generalizes
//! the teacher's sliding-window call-log throttle into true token-bucket
//! semantics with burst capacity, since a sliding window can't express "50
//! sustained, burst to 60" without keeping the whole window in memory.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::errors::ExchangeError;

pub struct RateLimiterConfig {
    pub sustained_per_second: f64,
    pub burst: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            sustained_per_second: 50.0,
            burst: 10.0,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A single shared bucket per exchange connection. `acquire` blocks the
/// caller until a token is available or `deadline` would be exceeded, in
/// which case it returns `ExchangeError::RateLimited` rather than waiting
/// past the caller's budget.
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let burst = config.burst;
        Self {
            config,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.sustained_per_second)
            .min(self.config.burst);
        bucket.last_refill = Instant::now();
    }

    /// Waits for one token, honoring `deadline` as a maximum time this call
    /// is willing to wait. Returns `ExchangeError::RateLimited` if the
    /// estimated wait would exceed it.
    pub async fn acquire(&self, deadline: Duration) -> Result<(), ExchangeError> {
        let wait = {
            let mut bucket = self.bucket.lock().unwrap();
            self.refill(&mut bucket);
            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                None
            } else {
                let deficit = 1.0 - bucket.tokens;
                let needed = Duration::from_secs_f64(deficit / self.config.sustained_per_second);
                if needed > deadline {
                    return Err(ExchangeError::RateLimited);
                }
                bucket.tokens = 0.0;
                Some(needed)
            }
        };

        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_capacity_allows_immediate_back_to_back_calls() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            sustained_per_second: 1.0,
            burst: 5.0,
        });
        for _ in 0..5 {
            limiter.acquire(Duration::from_millis(10)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn exhausted_bucket_rejects_when_wait_exceeds_deadline() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            sustained_per_second: 1.0,
            burst: 1.0,
        });
        limiter.acquire(Duration::from_millis(10)).await.unwrap();
        let result = limiter.acquire(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(ExchangeError::RateLimited)));
    }
}
