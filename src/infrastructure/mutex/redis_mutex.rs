//! Distributed mutex backed by Redis's atomic `SET key value NX PX ttl`.
//! Grounded on the `redis` crate usage in the HyperLiquidMM example repo —
//! the teacher itself has no KV dependency, so this is imported from the
//! rest of the pack rather than adapted from a teacher file.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

use crate::domain::ports::{DistributedMutex, MutexGuard as MutexGuardTrait};

pub struct RedisMutex {
    client: redis::Client,
}

impl RedisMutex {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

pub struct RedisGuard {
    client: redis::Client,
    key: String,
    token: String,
}

impl MutexGuardTrait for RedisGuard {}

impl Drop for RedisGuard {
    fn drop(&mut self) {
        let client = self.client.clone();
        let key = self.key.clone();
        let token = self.token.clone();
        // Best-effort release; the TTL bounds worst-case hold time even if
        // this task never runs (e.g. process killed mid-drop).
        tokio::spawn(async move {
            let Ok(mut conn) = client.get_multiplexed_async_connection().await else {
                return;
            };
            let held: Option<String> = conn.get(&key).await.ok().flatten();
            if held.as_deref() == Some(token.as_str()) {
                let _: Result<(), _> = conn.del(&key).await;
            }
        });
    }
}

#[async_trait]
impl DistributedMutex for RedisMutex {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Option<Box<dyn MutexGuardTrait>> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "redis mutex: connection failed");
                return None;
            }
        };

        let token = uuid::Uuid::new_v4().to_string();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .ok()
            .flatten();

        acquired.map(|_| {
            Box::new(RedisGuard {
                client: self.client.clone(),
                key: key.to_string(),
                token,
            }) as Box<dyn MutexGuardTrait>
        })
    }
}
