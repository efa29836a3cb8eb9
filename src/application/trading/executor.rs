//! TradeExecutor: executes an approved intent exactly once, records it
//! authentically, and hands off monitoring. Grounded on the teacher's
//! `application::agents::executor::Executor` (pre-persist before calling
//! the exchange, optimistic update on success, reconcile-on-startup), with
//! the distributed mutex and immediate-fill probe this spec requires added
//! on top.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use crate::application::trading::decider::Sizing;
use crate::application::trading::order_monitor::OrderMonitor;
use crate::domain::bot::Bot;
use crate::domain::errors::TradeError;
use crate::domain::events::TradingEvent;
use crate::domain::ports::{DistributedMutex, ExchangeGateway, OrderState};
use crate::domain::repositories::{BotRepository, TradeRepository};
use crate::domain::trade::{Side, Trade, TradeStatus};
use crate::infrastructure::event_bus::EventBus;

const MUTEX_TTL: Duration = Duration::from_secs(30);
const IMMEDIATE_FILL_POLLS: u32 = 10;
const IMMEDIATE_FILL_INTERVAL: Duration = Duration::from_millis(500);

pub struct TradeExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    mutex: Arc<dyn DistributedMutex>,
    bots: Arc<dyn BotRepository>,
    trades: Arc<dyn TradeRepository>,
    event_bus: Arc<EventBus>,
    order_monitor: Arc<OrderMonitor>,
}

impl TradeExecutor {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        mutex: Arc<dyn DistributedMutex>,
        bots: Arc<dyn BotRepository>,
        trades: Arc<dyn TradeRepository>,
        event_bus: Arc<EventBus>,
        order_monitor: Arc<OrderMonitor>,
    ) -> Self {
        Self {
            gateway,
            mutex,
            bots,
            trades,
            event_bus,
            order_monitor,
        }
    }

    /// Executes a `CONFIRMED` action that has already passed `TradeDecider`.
    /// Re-runs the cheap gates under lock as defense in depth against races
    /// across the decider/executor boundary.
    #[instrument(skip(self, sizing), fields(bot_id = %bot_id))]
    pub async fn execute(
        &self,
        bot_id: &str,
        side: Side,
        sizing: Sizing,
        signal_context: Option<serde_json::Value>,
    ) -> Result<Trade, TradeError> {
        let lock_key = format!("trade:{bot_id}");
        let guard = self
            .mutex
            .try_acquire(&lock_key, MUTEX_TTL)
            .await
            .ok_or_else(|| TradeError::Busy {
                bot_id: bot_id.to_string(),
            })?;

        let result = self.execute_locked(bot_id, side, sizing, signal_context).await;
        drop(guard);
        result
    }

    async fn execute_locked(
        &self,
        bot_id: &str,
        side: Side,
        sizing: Sizing,
        signal_context: Option<serde_json::Value>,
    ) -> Result<Trade, TradeError> {
        let bot = self
            .bots
            .get(bot_id)
            .await
            .map_err(|e| TradeError::Execution {
                reason: e.to_string(),
            })?;

        self.reassert_gates(&bot).await?;

        let mut trade = Trade::new_pending(
            format!("bot:{bot_id}"),
            bot.pair.clone(),
            side,
            sizing.size_usd,
            Decimal::ZERO,
            Decimal::ZERO,
            signal_context,
        );

        // Pre-persist before calling the exchange: if this fails, abort
        // rather than risk a placed order with no local record.
        if let Err(e) = self.trades.insert(&trade).await {
            error!(error = %e, "aborting execution: could not pre-persist trade");
            return Err(TradeError::Execution {
                reason: format!("pre-persist failed: {e}"),
            });
        }

        let placed = match self
            .gateway
            .place_market_order(&bot.pair, side, sizing.size_usd)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "order placement failed, resetting confirmation");
                let _ = self
                    .trades
                    .transition_status(
                        &trade.id,
                        TradeStatus::Pending,
                        TradeStatus::Failed,
                        None,
                        None,
                        None,
                        None,
                        None,
                        None,
                    )
                    .await;
                self.event_bus
                    .publish(TradingEvent::SyncIssue {
                        trade_id: trade.id.clone(),
                        reason: format!("placement failed: {e}"),
                    })
                    .await;
                return Err(TradeError::Execution { reason: e.to_string() });
            }
        };

        trade.order_id = Some(placed.order_id.clone());
        trade.price = placed.exchange_price;
        trade.size_crypto = if placed.exchange_price.is_zero() {
            Decimal::ZERO
        } else {
            sizing.size_usd / placed.exchange_price
        };

        let terminal_status = self.immediate_fill_probe(&placed.order_id).await;

        match terminal_status {
            Some((filled_price, filled_size, commission, filled_quote_usd)) => {
                trade.status = TradeStatus::Completed;
                trade.filled_at = Some(chrono::Utc::now());
                trade.price = filled_price;
                trade.size_crypto = filled_size;
                trade.commission_usd = commission;
                if !filled_quote_usd.is_zero() {
                    trade.size_usd = filled_quote_usd;
                }
                let _ = self
                    .trades
                    .transition_status(
                        &trade.id,
                        TradeStatus::Pending,
                        TradeStatus::Completed,
                        Some(&placed.order_id),
                        Some(filled_price),
                        Some(filled_size),
                        Some(commission),
                        trade.filled_at,
                        Some(filled_quote_usd),
                    )
                    .await;
            }
            None => {
                let _ = self
                    .trades
                    .transition_status(
                        &trade.id,
                        TradeStatus::Pending,
                        TradeStatus::Pending,
                        Some(&placed.order_id),
                        None,
                        None,
                        None,
                        None,
                        None,
                    )
                    .await;
                self.order_monitor
                    .watch(placed.order_id.clone(), trade.id.clone(), bot_id.to_string())
                    .await;
            }
        }

        self.event_bus
            .publish(TradingEvent::trade_status(&trade, format!("bot:{bot_id}")))
            .await;

        info!(trade_id = %trade.id, status = trade.status.as_str(), "trade recorded");
        Ok(trade)
    }

    /// Re-checks the pending-order and cooldown gates under lock, since bot
    /// state may have changed between `TradeDecider`'s decision and this
    /// call acquiring the lock.
    async fn reassert_gates(&self, bot: &Bot) -> Result<(), TradeError> {
        let pending = self
            .trades
            .find_pending_for_bot(&bot.id)
            .await
            .map_err(|e| TradeError::Execution { reason: e.to_string() })?;
        if !pending.is_empty() {
            return Err(TradeError::PendingOrderExists {
                bot_id: bot.id.clone(),
            });
        }

        if let Ok(Some(last)) = self.trades.find_last_completed_for_bot(&bot.id).await {
            if let Some(filled_at) = last.filled_at {
                let elapsed = (chrono::Utc::now() - filled_at).num_seconds();
                if elapsed < bot.cooldown_seconds {
                    return Err(TradeError::CooldownActive {
                        remaining_secs: bot.cooldown_seconds - elapsed,
                    });
                }
            }
        }

        Ok(())
    }

    /// Polls `GetOrderStatus` up to 10 times at 500ms intervals (total ≤
    /// 5s). Returns `Some((price, size, commission, filled_quote_usd))` if
    /// any poll observes `filled`.
    async fn immediate_fill_probe(&self, order_id: &str) -> Option<(Decimal, Decimal, Decimal, Decimal)> {
        for _ in 0..IMMEDIATE_FILL_POLLS {
            tokio::time::sleep(IMMEDIATE_FILL_INTERVAL).await;
            if let Ok(status) = self.gateway.get_order_status(order_id).await {
                if status.state == OrderState::Filled {
                    return Some((status.filled_price, status.filled_size, status.commission, status.filled_quote_usd));
                }
            }
        }
        None
    }
}
