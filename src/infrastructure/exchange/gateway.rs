//! `BinanceGateway`: the concrete `ExchangeGateway` this spec requires.
//! Generalizes the teacher's `BinanceExecutionService` +
//! `BinanceMarketDataService` (HMAC-signed REST calls behind a circuit
//! breaker, a token-bucket-limited request path) into the single
//! `ExchangeGateway` trait, since this spec targets one exchange rather than
//! the teacher's multi-broker `ExecutionService`/`MarketDataService` split.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::domain::errors::ExchangeError;
use crate::domain::market::{AccountBalance, Candle, Granularity, Ticker};
use crate::domain::ports::{ExchangeGateway, OrderState, OrderStatus, PlacedOrder};
use crate::domain::trade::Side;
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, build_url_with_query};
use crate::infrastructure::core::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::exchange::websocket::{StreamingManager, denormalize_pair, normalize_pair};

type HmacSha256 = Hmac<Sha256>;

pub struct BinanceGateway {
    client: ClientWithMiddleware,
    api_key: String,
    api_secret: String,
    base_url: String,
    streaming: StreamingManager,
    limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    ticker_ttl: chrono::Duration,
    max_staleness: chrono::Duration,
}

impl BinanceGateway {
    pub fn new(
        api_key: String,
        api_secret: String,
        base_url: String,
        ws_url: String,
        ticker_ttl_seconds: i64,
        max_staleness_seconds: i64,
    ) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            api_key,
            api_secret,
            base_url,
            streaming: StreamingManager::new(ws_url),
            limiter: RateLimiter::new(RateLimiterConfig::default()),
            circuit_breaker: CircuitBreaker::new("exchange_rest", 5, 2, Duration::from_secs(30)),
            ticker_ttl: chrono::Duration::seconds(ticker_ttl_seconds),
            max_staleness: chrono::Duration::seconds(max_staleness_seconds),
        }
    }

    /// Routes every REST call through the shared circuit breaker so a
    /// streak of exchange failures stops hammering it instead of retrying
    /// into a worsening outage.
    async fn guarded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, ExchangeError>>,
    ) -> Result<T, ExchangeError> {
        self.circuit_breaker.call(fut).await.map_err(|e| match e {
            CircuitBreakerError::Open(_) => ExchangeError::Transient {
                reason: "circuit breaker open: exchange REST calls are failing".to_string(),
            },
            CircuitBreakerError::Inner(inner) => inner,
        })
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts a key of any size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn signed_query(&self, mut params: Vec<(String, String)>) -> String {
        params.push(("timestamp".to_string(), Utc::now().timestamp_millis().to_string()));
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }

    async fn fetch_ticker_rest(&self, pair: &str) -> Result<Ticker, ExchangeError> {
        self.limiter
            .acquire(Duration::from_secs(2))
            .await
            .map_err(|_| ExchangeError::RateLimited)?;

        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            denormalize_pair(pair)
        );
        let response = self.client.get(&url).send().await.map_err(|e| ExchangeError::Transient {
            reason: e.to_string(),
        })?;

        #[derive(Deserialize)]
        struct PriceTicker {
            price: String,
        }
        let parsed: PriceTicker = response.json().await.map_err(|e| ExchangeError::Transient {
            reason: e.to_string(),
        })?;
        let price = parsed.price.parse::<f64>().ok().and_then(Decimal::from_f64_retain).unwrap_or(Decimal::ZERO);

        Ok(Ticker {
            price,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn start_streaming(&self, pairs: &[String], event_bus: Arc<EventBus>) -> Result<(), ExchangeError> {
        self.streaming.update_subscription(pairs.to_vec(), event_bus).await;
        Ok(())
    }

    async fn stop_streaming(&self) {
        self.streaming.stop().await;
    }

    /// Prefers the streamed value while it's within `ticker_ttl`; falls back
    /// to REST once it goes stale, and only gives up with `StaleTicker` once
    /// the REST fetch also fails and the streamed value exceeds
    /// `max_staleness`.
    async fn get_ticker(&self, pair: &str) -> Result<Ticker, ExchangeError> {
        let streamed = self.streaming.tickers().read().await.get(pair).copied();
        if let Some(t) = streamed {
            if t.age(Utc::now()) <= self.ticker_ttl {
                return Ok(t);
            }
        }

        match self.fetch_ticker_rest(pair).await {
            Ok(t) => Ok(t),
            Err(e) => {
                if let Some(t) = streamed {
                    if t.age(Utc::now()) <= self.max_staleness {
                        return Ok(t);
                    }
                }
                warn!(pair, error = %e, "ticker stale and REST fallback failed");
                Err(ExchangeError::StaleTicker { pair: pair.to_string() })
            }
        }
    }

    async fn get_candles(
        &self,
        pair: &str,
        granularity: Granularity,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.limiter
            .acquire(Duration::from_secs(5))
            .await
            .map_err(|_| ExchangeError::RateLimited)?;

        let interval = match granularity {
            Granularity::OneMinute => "1m",
            Granularity::FiveMinutes => "5m",
            Granularity::FifteenMinutes => "15m",
            Granularity::OneHour => "1h",
            Granularity::FourHours => "4h",
            Granularity::OneDay => "1d",
        };

        let url = format!("{}/api/v3/klines", self.base_url);
        let limit_str = limit.to_string();
        let url_with_query = build_url_with_query(
            &url,
            &[
                ("symbol", denormalize_pair(pair).as_str()),
                ("interval", interval),
                ("limit", &limit_str),
            ],
        );

        let response = self
            .client
            .get(&url_with_query)
            .send()
            .await
            .map_err(|e| ExchangeError::Transient { reason: e.to_string() })?;

        let klines: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ExchangeError::Transient { reason: e.to_string() })?;

        let candles = klines
            .into_iter()
            .filter_map(|k| {
                let arr = k.as_array()?;
                let ts = arr.first()?.as_i64()?;
                let parse = |i: usize| -> Option<Decimal> {
                    arr.get(i)?.as_str()?.parse::<f64>().ok().and_then(Decimal::from_f64_retain)
                };
                Some(Candle {
                    open: parse(1)?,
                    high: parse(2)?,
                    low: parse(3)?,
                    close: parse(4)?,
                    volume: parse(5)?,
                    timestamp: DateTime::from_timestamp_millis(ts)?,
                })
            })
            .collect();

        Ok(candles)
    }

    async fn get_accounts(&self) -> Result<Vec<(String, AccountBalance)>, ExchangeError> {
        self.limiter
            .acquire(Duration::from_secs(5))
            .await
            .map_err(|_| ExchangeError::RateLimited)?;

        self.guarded(async {
            let query = self.signed_query(vec![]).await;
            let url = format!("{}/api/v3/account?{}", self.base_url, query);
            let response = self
                .client
                .get(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await
                .map_err(|e| ExchangeError::Transient { reason: e.to_string() })?;

            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                return Err(ExchangeError::Auth {
                    reason: "exchange rejected API key".to_string(),
                });
            }

            #[derive(Deserialize)]
            struct Balance {
                asset: String,
                free: String,
            }
            #[derive(Deserialize)]
            struct Account {
                balances: Vec<Balance>,
            }
            let account: Account = response.json().await.map_err(|e| ExchangeError::Transient { reason: e.to_string() })?;

            Ok(account
                .balances
                .into_iter()
                .map(|b| {
                    let is_cash = b.asset == "USDT" || b.asset == "USD";
                    let available = b.free.parse::<Decimal>().unwrap_or(Decimal::ZERO);
                    (b.asset, AccountBalance { available, is_cash })
                })
                .collect())
        })
        .await
    }

    async fn place_market_order(
        &self,
        pair: &str,
        side: Side,
        size_usd: Decimal,
    ) -> Result<PlacedOrder, ExchangeError> {
        self.limiter
            .acquire(Duration::from_secs(3))
            .await
            .map_err(|_| ExchangeError::RateLimited)?;

        self.guarded(async {
            let query = self
                .signed_query(vec![
                    ("symbol".to_string(), denormalize_pair(pair)),
                    ("side".to_string(), side.as_str().to_string()),
                    ("type".to_string(), "MARKET".to_string()),
                    ("quoteOrderQty".to_string(), size_usd.to_string()),
                ])
                .await;
            let url = format!("{}/api/v3/order?{}", self.base_url, query);

            let response = self
                .client
                .post(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await
                .map_err(|e| ExchangeError::Transient { reason: e.to_string() })?;

            if !response.status().is_success() {
                let text = response.text().await.unwrap_or_default();
                warn!(status_text = %text, "order placement rejected by exchange");
                return Err(ExchangeError::Transient { reason: text });
            }

            #[derive(Deserialize)]
            struct OrderResponse {
                #[serde(rename = "orderId")]
                order_id: i64,
                #[serde(rename = "executedQty")]
                executed_qty: String,
                #[serde(default)]
                fills: Vec<Fill>,
            }
            #[derive(Deserialize)]
            struct Fill {
                price: String,
            }

            let parsed: OrderResponse = response.json().await.map_err(|e| ExchangeError::Transient { reason: e.to_string() })?;
            let exchange_size = parsed.executed_qty.parse::<Decimal>().unwrap_or(Decimal::ZERO);
            let exchange_price = parsed
                .fills
                .first()
                .and_then(|f| f.price.parse::<Decimal>().ok())
                .unwrap_or(Decimal::ZERO);

            info!(order_id = parsed.order_id, "order placed");
            Ok(PlacedOrder {
                order_id: parsed.order_id.to_string(),
                exchange_size,
                exchange_price,
            })
        })
        .await
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, ExchangeError> {
        self.limiter
            .acquire(Duration::from_secs(3))
            .await
            .map_err(|_| ExchangeError::RateLimited)?;

        let query = self
            .signed_query(vec![("orderId".to_string(), order_id.to_string())])
            .await;
        let url = format!("{}/api/v3/order?{}", self.base_url, query);

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Transient { reason: e.to_string() })?;

        #[derive(Deserialize)]
        struct OrderResponse {
            status: String,
            #[serde(rename = "executedQty")]
            executed_qty: String,
            #[serde(rename = "cummulativeQuoteQty")]
            cumulative_quote_qty: String,
        }

        let parsed: OrderResponse = response.json().await.map_err(|e| ExchangeError::Transient { reason: e.to_string() })?;

        let state = match parsed.status.as_str() {
            "FILLED" => OrderState::Filled,
            "CANCELED" | "EXPIRED" => OrderState::Cancelled,
            "REJECTED" => OrderState::Rejected,
            _ => OrderState::Open,
        };

        let filled_size = parsed.executed_qty.parse::<Decimal>().unwrap_or(Decimal::ZERO);
        let cumulative_quote = parsed.cumulative_quote_qty.parse::<Decimal>().unwrap_or(Decimal::ZERO);
        let filled_price = if filled_size.is_zero() {
            Decimal::ZERO
        } else {
            cumulative_quote / filled_size
        };

        Ok(OrderStatus {
            state,
            filled_size,
            filled_price,
            commission: Decimal::ZERO,
            filled_quote_usd: cumulative_quote,
        })
    }

    fn min_exchange_lot(&self, _pair: &str) -> Decimal {
        Decimal::new(1, 4) // 0.0001, a conservative default lot size
    }
}

#[allow(dead_code)]
fn normalize(symbol: &str) -> Option<String> {
    normalize_pair(symbol)
}

pub fn wrap(gateway: BinanceGateway) -> Arc<dyn ExchangeGateway> {
    Arc::new(gateway)
}
