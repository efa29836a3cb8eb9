//! ReconciliationSweeper: periodically reconciles `pending` trades with
//! exchange reality, catching anything the monitor missed. Grounded on the
//! teacher's `OrderReconciler` TTL-based pending-order cleanup, adapted to
//! this spec's `Trade`/`TradeRepository` shape.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::events::TradingEvent;
use crate::domain::ports::{ExchangeGateway, OrderState};
use crate::domain::repositories::TradeRepository;
use crate::domain::trade::TradeStatus;
use crate::infrastructure::event_bus::EventBus;

pub struct SweeperConfig {
    pub interval: Duration,
    pub grace_seconds: i64,
    pub stale_alert_threshold_seconds: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            grace_seconds: 10,
            stale_alert_threshold_seconds: 600,
        }
    }
}

#[derive(Default)]
pub struct SweeperCounters {
    pub resolved_by_sweeper: AtomicU64,
    pub stale_alerts: AtomicU64,
}

pub struct ReconciliationSweeper {
    gateway: Arc<dyn ExchangeGateway>,
    trades: Arc<dyn TradeRepository>,
    event_bus: Arc<EventBus>,
    config: SweeperConfig,
    counters: Arc<SweeperCounters>,
}

impl ReconciliationSweeper {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        trades: Arc<dyn TradeRepository>,
        event_bus: Arc<EventBus>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            gateway,
            trades,
            event_bus,
            config,
            counters: Arc::new(SweeperCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<SweeperCounters> {
        self.counters.clone()
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.config.interval);
            loop {
                tick.tick().await;
                self.run_once().await;
            }
        })
    }

    /// One sweep pass. Idempotent over already-terminal trades: a trade
    /// that another path already resolved simply won't be in the pending
    /// set by the time this reads the store.
    pub async fn run_once(&self) {
        let Ok(pending) = self.trades.find_pending_older_than(self.config.grace_seconds).await
        else {
            warn!("sweeper: failed to load pending trades");
            return;
        };

        for trade in pending {
            let Some(order_id) = &trade.order_id else {
                continue;
            };

            let age = (Utc::now() - trade.created_at).num_seconds();
            if age >= self.config.stale_alert_threshold_seconds {
                self.counters.stale_alerts.fetch_add(1, Ordering::Relaxed);
                self.event_bus
                    .publish(TradingEvent::SyncIssue {
                        trade_id: trade.id.clone(),
                        reason: format!("pending trade age {age}s exceeds stale_alert_threshold"),
                    })
                    .await;
            }

            let status = match self.gateway.get_order_status(order_id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(order_id, error = %e, "sweeper: status poll failed");
                    continue;
                }
            };

            let (new_status, terminal) = match status.state {
                OrderState::Open => (TradeStatus::Pending, false),
                OrderState::Filled => (TradeStatus::Completed, true),
                OrderState::Cancelled => (TradeStatus::Cancelled, true),
                OrderState::Rejected => (TradeStatus::Failed, true),
            };

            if !terminal {
                continue;
            }

            let filled_at = if new_status == TradeStatus::Completed {
                Some(Utc::now())
            } else {
                None
            };

            let result = self
                .trades
                .transition_status(
                    &trade.id,
                    TradeStatus::Pending,
                    new_status,
                    Some(order_id),
                    Some(status.filled_price),
                    Some(status.filled_size),
                    Some(status.commission),
                    filled_at,
                    (new_status == TradeStatus::Completed).then_some(status.filled_quote_usd),
                )
                .await;

            if result.is_ok() {
                self.counters.resolved_by_sweeper.fetch_add(1, Ordering::Relaxed);
                info!(trade_id = %trade.id, "sweeper resolved trade the monitor missed");
                self.event_bus
                    .publish(TradingEvent::TradeStatus {
                        trade_id: trade.id.clone(),
                        order_id: trade.order_id.clone(),
                        bot_id: trade.triggered_by.clone(),
                        status: new_status,
                    })
                    .await;
            }
        }
    }
}
