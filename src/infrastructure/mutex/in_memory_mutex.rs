//! Process-local fallback for the distributed mutex, backing
//! `TRADING_MODE=test` and single-process integration tests. Not a
//! substitute for `RedisMutex` in any multi-worker deployment.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::ports::{DistributedMutex, MutexGuard as MutexGuardTrait};

struct Held {
    expires_at: Instant,
}

pub struct InMemoryMutex {
    held: Arc<Mutex<HashMap<String, Held>>>,
}

impl InMemoryMutex {
    pub fn new() -> Self {
        Self {
            held: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryMutex {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InMemoryGuard {
    key: String,
    held: Arc<Mutex<HashMap<String, Held>>>,
}

impl MutexGuardTrait for InMemoryGuard {}

impl Drop for InMemoryGuard {
    fn drop(&mut self) {
        let held = self.held.clone();
        let key = self.key.clone();
        tokio::spawn(async move {
            held.lock().await.remove(&key);
        });
    }
}

#[async_trait]
impl DistributedMutex for InMemoryMutex {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Option<Box<dyn MutexGuardTrait>> {
        let mut guard = self.held.lock().await;
        let now = Instant::now();
        if let Some(existing) = guard.get(key) {
            if existing.expires_at > now {
                return None;
            }
        }
        guard.insert(
            key.to_string(),
            Held {
                expires_at: now + ttl,
            },
        );
        Some(Box::new(InMemoryGuard {
            key: key.to_string(),
            held: self.held.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_first_is_held() {
        let mutex = InMemoryMutex::new();
        let guard = mutex.try_acquire("trade:b1", Duration::from_secs(30)).await;
        assert!(guard.is_some());
        let second = mutex.try_acquire("trade:b1", Duration::from_secs(30)).await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn acquire_succeeds_again_after_guard_drops() {
        let mutex = InMemoryMutex::new();
        {
            let _guard = mutex.try_acquire("trade:b1", Duration::from_secs(30)).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = mutex.try_acquire("trade:b1", Duration::from_secs(30)).await;
        assert!(second.is_some());
    }
}
