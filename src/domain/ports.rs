use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::ExchangeError;
use crate::domain::market::{AccountBalance, Candle, Granularity, Ticker};
use crate::domain::trade::Side;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Open,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderStatus {
    pub state: OrderState,
    pub filled_size: Decimal,
    pub filled_price: Decimal,
    pub commission: Decimal,
    /// The USD notional actually transacted, as confirmed by the exchange
    /// (Binance's `cummulativeQuoteQty`). Zero when the order has not
    /// filled. This, not `filled_size * filled_price`, is what gets written
    /// back onto `Trade.size_usd` on completion.
    pub filled_quote_usd: Decimal,
}

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: String,
    pub exchange_size: Decimal,
    pub exchange_price: Decimal,
}

/// Every interaction with the remote exchange, plus in-process fan-out of
/// what the exchange tells us. One concrete adapter implements this for the
/// exchange the deployment targets; `TRADING_MODE=test` swaps in a mock.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Subscribes to ticker and user channels for the given pairs.
    /// Idempotent; calling again with a new pair set replaces the current
    /// subscription. Every tick observed is published as
    /// `TradingEvent::Ticker` on `event_bus`, on the `ticker.<pair>` topic,
    /// so evaluation can be driven by market data arrival rather than only
    /// the periodic safety net.
    async fn start_streaming(&self, pairs: &[String], event_bus: Arc<EventBus>) -> Result<(), ExchangeError>;

    async fn stop_streaming(&self);

    async fn get_ticker(&self, pair: &str) -> Result<Ticker, ExchangeError>;

    async fn get_candles(
        &self,
        pair: &str,
        granularity: Granularity,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn get_accounts(&self) -> Result<Vec<(String, AccountBalance)>, ExchangeError>;

    async fn place_market_order(
        &self,
        pair: &str,
        side: Side,
        size_usd: Decimal,
    ) -> Result<PlacedOrder, ExchangeError>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, ExchangeError>;

    fn min_exchange_lot(&self, pair: &str) -> Decimal;
}

/// Abstracts "now" so confirmation/cooldown math is testable without real
/// sleeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// RAII guard released on every exit path, including panics, via `Drop`.
/// The concrete implementation (`infrastructure::mutex`) is responsible for
/// actually releasing the external lock when the guard drops.
pub trait MutexGuard: Send {}

/// A process-external "set if not exists with expiration" primitive, used
/// to serialize trade execution for one bot across multiple worker
/// processes. In-process locks are insufficient: the deployment runs
/// multiple workers concurrently sharing the same bots.
#[async_trait]
pub trait DistributedMutex: Send + Sync {
    /// Non-blocking: returns `None` immediately if the lock is already
    /// held, rather than waiting.
    async fn try_acquire(&self, key: &str, ttl: std::time::Duration) -> Option<Box<dyn MutexGuard>>;
}
