//! `MockGateway`: the `TRADING_MODE=test` exchange. Auto-fills every order
//! immediately at the last known ticker price and never touches a network
//! socket, so scenario tests and local runs exercise the full bot loop
//! without exchange credentials. Grounded on the teacher's
//! `MockExecutionService`/`MockMarketDataService` pair, collapsed into the
//! single `ExchangeGateway` seam this spec uses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

use crate::domain::errors::ExchangeError;
use crate::domain::events::TradingEvent;
use crate::domain::market::{AccountBalance, Candle, Granularity, Ticker};
use crate::domain::ports::{ExchangeGateway, OrderState, OrderStatus, PlacedOrder};
use crate::domain::trade::Side;
use crate::infrastructure::event_bus::EventBus;

/// A placed order plus the time it was placed, so `get_order_status` can
/// hold it `Open` for `fill_delay` before reporting the terminal state —
/// letting `TRADING_MODE=test` exercise the monitor/sweeper path instead of
/// always resolving inside `place_market_order`.
struct PendingFill {
    placed_at: Instant,
    terminal: OrderStatus,
}

pub struct MockGateway {
    tickers: RwLock<HashMap<String, Ticker>>,
    balances: RwLock<HashMap<String, AccountBalance>>,
    orders: RwLock<HashMap<String, PendingFill>>,
    next_order_id: AtomicU64,
    fill_delay: Duration,
    event_bus: RwLock<Option<Arc<EventBus>>>,
}

impl MockGateway {
    pub fn new(starting_cash_usd: Decimal) -> Self {
        Self::with_fill_delay(starting_cash_usd, Duration::ZERO)
    }

    pub fn with_fill_delay(starting_cash_usd: Decimal, fill_delay: Duration) -> Self {
        let mut balances = HashMap::new();
        balances.insert(
            "USD".to_string(),
            AccountBalance {
                available: starting_cash_usd,
                is_cash: true,
            },
        );
        Self {
            tickers: RwLock::new(HashMap::new()),
            balances: RwLock::new(balances),
            orders: RwLock::new(HashMap::new()),
            next_order_id: AtomicU64::new(1),
            fill_delay,
            event_bus: RwLock::new(None),
        }
    }

    pub async fn set_ticker(&self, pair: &str, price: Decimal) {
        let timestamp = Utc::now();
        self.tickers
            .write()
            .await
            .insert(pair.to_string(), Ticker { price, timestamp });
        if let Some(bus) = self.event_bus.read().await.as_ref() {
            bus.publish(TradingEvent::Ticker {
                pair: pair.to_string(),
                price,
                timestamp,
            })
            .await;
        }
    }

    fn base_asset(pair: &str) -> &str {
        pair.split('-').next().unwrap_or(pair)
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new(dec!(10000))
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn start_streaming(&self, pairs: &[String], event_bus: Arc<EventBus>) -> Result<(), ExchangeError> {
        *self.event_bus.write().await = Some(event_bus);
        let mut tickers = self.tickers.write().await;
        for pair in pairs {
            tickers.entry(pair.clone()).or_insert(Ticker {
                price: dec!(100),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn stop_streaming(&self) {}

    async fn get_ticker(&self, pair: &str) -> Result<Ticker, ExchangeError> {
        self.tickers
            .read()
            .await
            .get(pair)
            .copied()
            .ok_or_else(|| ExchangeError::Transient {
                reason: format!("no mock ticker seeded for {pair}"),
            })
    }

    async fn get_candles(
        &self,
        pair: &str,
        granularity: Granularity,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let ticker = self.get_ticker(pair).await?;
        let step = granularity.as_seconds();
        let candles = (0..limit)
            .rev()
            .map(|i| {
                let ts = ticker.timestamp - chrono::Duration::seconds(step * i as i64);
                Candle {
                    open: ticker.price,
                    high: ticker.price,
                    low: ticker.price,
                    close: ticker.price,
                    volume: dec!(1),
                    timestamp: ts,
                }
            })
            .collect();
        Ok(candles)
    }

    async fn get_accounts(&self) -> Result<Vec<(String, AccountBalance)>, ExchangeError> {
        Ok(self.balances.read().await.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }

    async fn place_market_order(
        &self,
        pair: &str,
        side: Side,
        size_usd: Decimal,
    ) -> Result<PlacedOrder, ExchangeError> {
        let ticker = self.get_ticker(pair).await?;
        let size_crypto = if ticker.price.is_zero() {
            Decimal::ZERO
        } else {
            size_usd / ticker.price
        };

        let base = Self::base_asset(pair).to_string();
        let mut balances = self.balances.write().await;
        let usd = balances.entry("USD".to_string()).or_insert(AccountBalance {
            available: Decimal::ZERO,
            is_cash: true,
        });
        match side {
            Side::Buy => usd.available -= size_usd,
            Side::Sell => usd.available += size_usd,
        }
        let crypto = balances.entry(base).or_insert(AccountBalance {
            available: Decimal::ZERO,
            is_cash: false,
        });
        match side {
            Side::Buy => crypto.available += size_crypto,
            Side::Sell => crypto.available -= size_crypto,
        }

        let order_id = format!("mock-{}", self.next_order_id.fetch_add(1, Ordering::Relaxed));
        let terminal = OrderStatus {
            state: OrderState::Filled,
            filled_size: size_crypto,
            filled_price: ticker.price,
            commission: Decimal::ZERO,
            filled_quote_usd: size_usd,
        };
        self.orders.write().await.insert(
            order_id.clone(),
            PendingFill {
                placed_at: Instant::now(),
                terminal,
            },
        );

        Ok(PlacedOrder {
            order_id,
            exchange_size: size_crypto,
            exchange_price: ticker.price,
        })
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, ExchangeError> {
        let orders = self.orders.read().await;
        let Some(pending) = orders.get(order_id) else {
            return Ok(OrderStatus {
                state: OrderState::Filled,
                filled_size: Decimal::ZERO,
                filled_price: Decimal::ZERO,
                commission: Decimal::ZERO,
                filled_quote_usd: Decimal::ZERO,
            });
        };

        if pending.placed_at.elapsed() < self.fill_delay {
            return Ok(OrderStatus {
                state: OrderState::Open,
                filled_size: Decimal::ZERO,
                filled_price: Decimal::ZERO,
                commission: Decimal::ZERO,
                filled_quote_usd: Decimal::ZERO,
            });
        }

        Ok(pending.terminal)
    }

    fn min_exchange_lot(&self, _pair: &str) -> Decimal {
        Decimal::new(1, 6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buy_then_sell_round_trips_cash_and_crypto_balances() {
        let gateway = MockGateway::new(dec!(1000));
        gateway.set_ticker("BTC-USD", dec!(100)).await;

        let placed = gateway
            .place_market_order("BTC-USD", Side::Buy, dec!(100))
            .await
            .unwrap();
        assert_eq!(placed.exchange_size, dec!(1));

        let accounts = gateway.get_accounts().await.unwrap();
        let usd = accounts.iter().find(|(k, _)| k == "USD").unwrap().1;
        assert_eq!(usd.available, dec!(900));

        gateway
            .place_market_order("BTC-USD", Side::Sell, dec!(50))
            .await
            .unwrap();
        let accounts = gateway.get_accounts().await.unwrap();
        let usd = accounts.iter().find(|(k, _)| k == "USD").unwrap().1;
        assert_eq!(usd.available, dec!(950));
    }

    #[tokio::test]
    async fn get_order_status_always_reports_filled() {
        let gateway = MockGateway::default();
        let status = gateway.get_order_status("whatever").await.unwrap();
        assert_eq!(status.state, OrderState::Filled);
    }

    #[tokio::test]
    async fn fill_delay_holds_order_open_until_elapsed() {
        let gateway = MockGateway::with_fill_delay(dec!(1000), Duration::from_millis(50));
        gateway.set_ticker("BTC-USD", dec!(100)).await;

        let placed = gateway
            .place_market_order("BTC-USD", Side::Buy, dec!(100))
            .await
            .unwrap();

        let status = gateway.get_order_status(&placed.order_id).await.unwrap();
        assert_eq!(status.state, OrderState::Open);

        tokio::time::sleep(Duration::from_millis(75)).await;
        let status = gateway.get_order_status(&placed.order_id).await.unwrap();
        assert_eq!(status.state, OrderState::Filled);
        assert_eq!(status.filled_quote_usd, dec!(100));
    }
}
