//! OrderMonitor: resolves individual pending orders quickly.
//!
//! Generalizes the shape of the teacher's `OrderMonitor` (a
//! `RwLock<HashMap<order_id, _>>` of tracked orders, register/on-event/
//! check-timeouts) from limit-order retry semantics into polling a PENDING
//! market order's status to a terminal state, per spec §4.6.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tracing::{info, instrument, warn};

use crate::domain::events::TradingEvent;
use crate::domain::ports::{ExchangeGateway, OrderState};
use crate::domain::repositories::TradeRepository;
use crate::domain::trade::TradeStatus;
use crate::infrastructure::event_bus::EventBus;

pub struct OrderMonitorConfig {
    pub poll_interval: Duration,
    pub max_monitor_duration: Duration,
    pub max_concurrent_watchers: usize,
}

impl Default for OrderMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_monitor_duration: Duration::from_secs(300),
            max_concurrent_watchers: 64,
        }
    }
}

pub struct OrderMonitor {
    gateway: Arc<dyn ExchangeGateway>,
    trades: Arc<dyn TradeRepository>,
    event_bus: Arc<EventBus>,
    config: OrderMonitorConfig,
    tracked: Arc<tokio::sync::Mutex<HashSet<String>>>,
    permits: Arc<Semaphore>,
}

impl OrderMonitor {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        trades: Arc<dyn TradeRepository>,
        event_bus: Arc<EventBus>,
        config: OrderMonitorConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_watchers));
        Self {
            gateway,
            trades,
            event_bus,
            config,
            tracked: Arc::new(tokio::sync::Mutex::new(HashSet::new())),
            permits,
        }
    }

    /// Registers `(order_id, trade_id, bot_id)` for watching. A no-op if a
    /// live watcher for `order_id` already exists. If the concurrency cap
    /// is exhausted, the order is left untracked — the `ReconciliationSweeper`
    /// will catch it on its next pass.
    #[instrument(skip(self))]
    pub async fn watch(&self, order_id: String, trade_id: String, bot_id: String) {
        {
            let mut tracked = self.tracked.lock().await;
            if tracked.contains(&order_id) {
                return;
            }
            tracked.insert(order_id.clone());
        }

        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            warn!(order_id, "monitor at capacity, leaving to sweeper");
            self.tracked.lock().await.remove(&order_id);
            return;
        };

        let gateway = self.gateway.clone();
        let trades = self.trades.clone();
        let event_bus = self.event_bus.clone();
        let config_poll = self.config.poll_interval;
        let config_max = self.config.max_monitor_duration;
        let tracked = self.tracked.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let start = tokio::time::Instant::now();
            loop {
                if start.elapsed() >= config_max {
                    break;
                }
                tokio::time::sleep(config_poll).await;

                let status = match gateway.get_order_status(&order_id).await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(order_id, error = %e, "order status poll failed");
                        continue;
                    }
                };

                let (new_status, terminal) = match status.state {
                    OrderState::Open => continue,
                    OrderState::Filled => (TradeStatus::Completed, true),
                    OrderState::Cancelled => (TradeStatus::Cancelled, true),
                    OrderState::Rejected => (TradeStatus::Failed, true),
                };

                if !terminal {
                    continue;
                }

                let filled_at = if new_status == TradeStatus::Completed {
                    Some(chrono::Utc::now())
                } else {
                    None
                };

                let result = trades
                    .transition_status(
                        &trade_id,
                        TradeStatus::Pending,
                        new_status,
                        Some(&order_id),
                        Some(status.filled_price),
                        Some(status.filled_size),
                        Some(status.commission),
                        filled_at,
                        (new_status == TradeStatus::Completed).then_some(status.filled_quote_usd),
                    )
                    .await;

                match result {
                    Ok(()) => {
                        info!(order_id, trade_id, status = new_status.as_str(), "order resolved");
                        event_bus
                            .publish(TradingEvent::TradeStatus {
                                trade_id: trade_id.clone(),
                                order_id: Some(order_id.clone()),
                                bot_id: bot_id.clone(),
                                status: new_status,
                            })
                            .await;
                    }
                    Err(e) => {
                        // Already resolved by the sweeper or a prior call;
                        // idempotent by design.
                        info!(order_id, error = %e, "order already resolved");
                    }
                }
                break;
            }
            tracked.lock().await.remove(&order_id);
        });
    }
}
