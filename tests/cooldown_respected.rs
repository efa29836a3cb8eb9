//! A second trade attempt on the same bot within its cooldown window is
//! rejected at the executor's own gate re-check, even though the first
//! trade resolved cleanly.

mod common;

use std::sync::Arc;

use rust_decimal_macros::dec;

use tradeforge_engine::application::trading::decider::Sizing;
use tradeforge_engine::application::trading::executor::TradeExecutor;
use tradeforge_engine::application::trading::order_monitor::{OrderMonitor, OrderMonitorConfig};
use tradeforge_engine::domain::errors::TradeError;
use tradeforge_engine::domain::trade::{Side, TradeStatus};
use tradeforge_engine::infrastructure::event_bus::EventBus;
use tradeforge_engine::infrastructure::exchange::MockGateway;
use tradeforge_engine::infrastructure::mutex::InMemoryMutex;

#[tokio::test]
async fn second_buy_within_cooldown_window_is_rejected() {
    let (bots, trades) = common::fresh_repos().await;
    let mut bot = common::sample_bot("b1", "BTC-USD");
    bot.cooldown_seconds = 900;
    bots.create(&bot).await.unwrap();

    let gateway = Arc::new(MockGateway::default());
    gateway.set_ticker("BTC-USD", dec!(40000)).await;
    let event_bus = Arc::new(EventBus::new(64));
    let mutex = Arc::new(InMemoryMutex::new());

    let executor = TradeExecutor::new(
        gateway.clone(),
        mutex.clone(),
        bots.clone(),
        trades.clone(),
        event_bus.clone(),
        Arc::new(OrderMonitor::new(
            gateway.clone(),
            trades.clone(),
            event_bus.clone(),
            OrderMonitorConfig::default(),
        )),
    );

    let first = executor
        .execute("b1", Side::Buy, Sizing { size_usd: dec!(50) }, None)
        .await
        .expect("first buy should fill and complete");
    assert_eq!(first.status, TradeStatus::Completed);

    let second = executor
        .execute("b1", Side::Buy, Sizing { size_usd: dec!(50) }, None)
        .await;

    assert!(matches!(second, Err(TradeError::CooldownActive { remaining_secs }) if remaining_secs > 0));
}
