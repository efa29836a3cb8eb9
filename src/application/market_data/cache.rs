//! MarketDataCache: eliminates duplicate REST calls for candles.
//!
//! Generalizes the teacher's `SpreadCache` (a plain `RwLock<HashMap>` with
//! poisoned-lock recovery) with the three properties the spec requires and
//! the teacher's simpler cache does not: single-flight request coalescing,
//! LRU eviction with a hard cap, and stale-on-error grace.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::domain::market::{Candle, Granularity};
use crate::domain::ports::ExchangeGateway;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced_waits: u64,
    pub evictions: u64,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct CachedCandles {
    pub candles: Vec<Candle>,
    pub stale: bool,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct Key {
    pair: String,
    granularity_secs: i64,
    limit: usize,
}

struct Entry {
    candles: Vec<Candle>,
    fetched_at: Instant,
    last_used: Instant,
}

pub struct MarketDataCache {
    entries: RwLock<HashMap<Key, Entry>>,
    inflight: Mutex<HashMap<Key, Arc<tokio::sync::Notify>>>,
    ttl: Duration,
    stale_grace: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced_waits: AtomicU64,
    evictions: AtomicU64,
}

impl MarketDataCache {
    pub fn new(ttl: Duration, stale_grace: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            ttl,
            stale_grace,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced_waits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub async fn get(
        &self,
        gateway: &dyn ExchangeGateway,
        pair: &str,
        granularity: Granularity,
        limit: usize,
    ) -> anyhow::Result<CachedCandles> {
        let key = Key {
            pair: pair.to_string(),
            granularity_secs: granularity.as_seconds(),
            limit,
        };

        if let Some(candles) = self.fresh_hit(&key).await {
            return Ok(CachedCandles {
                candles,
                stale: false,
            });
        }

        // Single-flight: only one concurrent fetch per key proceeds; other
        // callers await the same in-flight result instead of issuing their
        // own REST call.
        let notify = {
            let mut inflight = self.inflight.lock().await;
            if let Some(existing) = inflight.get(&key) {
                Some(existing.clone())
            } else {
                let n = Arc::new(tokio::sync::Notify::new());
                inflight.insert(key.clone(), n);
                None
            }
        };

        if let Some(notify) = notify {
            self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
            notify.notified().await;
            if let Some(candles) = self.fresh_hit(&key).await {
                return Ok(CachedCandles {
                    candles,
                    stale: false,
                });
            }
            // The leader's fetch failed and left nothing usable; fall
            // through and try to lead ourselves.
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = gateway.get_candles(pair, granularity, limit).await;

        let outcome = match result {
            Ok(candles) => {
                self.insert(key.clone(), candles.clone()).await;
                Ok(CachedCandles {
                    candles,
                    stale: false,
                })
            }
            Err(e) => match self.stale_entry(&key).await {
                Some(candles) => Ok(CachedCandles {
                    candles,
                    stale: true,
                }),
                None => Err(anyhow::anyhow!(e)),
            },
        };

        let waiters = self.inflight.lock().await.remove(&key);
        if let Some(notify) = waiters {
            notify.notify_waiters();
        }

        outcome
    }

    pub async fn invalidate(&self, pair: Option<&str>) {
        let mut guard = self.entries.write().await;
        match pair {
            Some(p) => guard.retain(|k, _| k.pair != p),
            None => guard.clear(),
        }
    }

    pub async fn stats(&self) -> Stats {
        Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.entries.read().await.len(),
        }
    }

    async fn fresh_hit(&self, key: &Key) -> Option<Vec<Candle>> {
        let mut guard = self.entries.write().await;
        let entry = guard.get_mut(key)?;
        if entry.fetched_at.elapsed() <= self.ttl {
            entry.last_used = Instant::now();
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.candles.clone())
        } else {
            None
        }
    }

    async fn stale_entry(&self, key: &Key) -> Option<Vec<Candle>> {
        let guard = self.entries.read().await;
        let entry = guard.get(key)?;
        if entry.fetched_at.elapsed() <= self.ttl + self.stale_grace {
            Some(entry.candles.clone())
        } else {
            None
        }
    }

    async fn insert(&self, key: Key, candles: Vec<Candle>) {
        let mut guard = self.entries.write().await;
        let now = Instant::now();
        guard.insert(
            key,
            Entry {
                candles,
                fetched_at: now,
                last_used: now,
            },
        );
        while guard.len() > self.capacity {
            if let Some(oldest_key) = guard
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                guard.remove(&oldest_key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;
    use crate::domain::errors::ExchangeError;
    use crate::domain::market::{AccountBalance, Ticker};
    use crate::domain::ports::{OrderStatus, PlacedOrder};
    use crate::domain::trade::Side;

    struct CountingGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExchangeGateway for CountingGateway {
        async fn start_streaming(
            &self,
            _pairs: &[String],
            _event_bus: Arc<crate::infrastructure::event_bus::EventBus>,
        ) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn stop_streaming(&self) {}
        async fn get_ticker(&self, _pair: &str) -> Result<Ticker, ExchangeError> {
            unimplemented!()
        }
        async fn get_candles(
            &self,
            _pair: &str,
            _granularity: Granularity,
            _limit: usize,
        ) -> Result<Vec<Candle>, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(vec![Candle {
                open: dec!(1),
                high: dec!(1),
                low: dec!(1),
                close: dec!(1),
                volume: dec!(1),
                timestamp: Utc::now(),
            }])
        }
        async fn get_accounts(&self) -> Result<Vec<(String, AccountBalance)>, ExchangeError> {
            unimplemented!()
        }
        async fn place_market_order(
            &self,
            _pair: &str,
            _side: Side,
            _size_usd: Decimal,
        ) -> Result<PlacedOrder, ExchangeError> {
            unimplemented!()
        }
        async fn get_order_status(&self, _order_id: &str) -> Result<OrderStatus, ExchangeError> {
            unimplemented!()
        }
        fn min_exchange_lot(&self, _pair: &str) -> Decimal {
            dec!(0.0001)
        }
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_fetch() {
        let gateway = Arc::new(CountingGateway {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(MarketDataCache::new(
            Duration::from_secs(30),
            Duration::from_secs(300),
            500,
        ));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get(gateway.as_ref(), "BTC-USD", Granularity::OneHour, 10)
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats().await;
        assert!(stats.coalesced_waits >= 1);
    }

    #[tokio::test]
    async fn hit_within_ttl_avoids_refetch() {
        let gateway = Arc::new(CountingGateway {
            calls: AtomicUsize::new(0),
        });
        let cache = MarketDataCache::new(Duration::from_secs(30), Duration::from_secs(300), 500);

        cache
            .get(gateway.as_ref(), "BTC-USD", Granularity::OneHour, 10)
            .await
            .unwrap();
        cache
            .get(gateway.as_ref(), "BTC-USD", Granularity::OneHour, 10)
            .await
            .unwrap();

        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
    }
}
