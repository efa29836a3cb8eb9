//! An order that the exchange fills within the immediate-fill probe window
//! is recorded as a completed trade without ever reaching the order
//! monitor's longer-lived polling loop.

mod common;

use std::sync::Arc;

use rust_decimal_macros::dec;

use tradeforge_engine::application::trading::decider::Sizing;
use tradeforge_engine::application::trading::executor::TradeExecutor;
use tradeforge_engine::application::trading::order_monitor::{OrderMonitor, OrderMonitorConfig};
use tradeforge_engine::domain::trade::{Side, TradeStatus};
use tradeforge_engine::infrastructure::event_bus::EventBus;
use tradeforge_engine::infrastructure::exchange::MockGateway;
use tradeforge_engine::infrastructure::mutex::InMemoryMutex;

#[tokio::test]
async fn market_buy_fills_immediately_and_is_recorded_completed() {
    let (bots, trades) = common::fresh_repos().await;
    let bot = common::sample_bot("b1", "BTC-USD");
    bots.create(&bot).await.unwrap();

    let gateway = Arc::new(MockGateway::default());
    gateway.set_ticker("BTC-USD", dec!(40000)).await;

    let event_bus = Arc::new(EventBus::new(64));
    let order_monitor = Arc::new(OrderMonitor::new(
        gateway.clone(),
        trades.clone(),
        event_bus.clone(),
        OrderMonitorConfig::default(),
    ));
    let executor = TradeExecutor::new(
        gateway.clone(),
        Arc::new(InMemoryMutex::new()),
        bots.clone(),
        trades.clone(),
        event_bus.clone(),
        order_monitor,
    );

    let trade = executor
        .execute("b1", Side::Buy, Sizing { size_usd: dec!(50) }, None)
        .await
        .expect("mock gateway always resolves to filled");

    assert_eq!(trade.status, TradeStatus::Completed);
    assert!(trade.filled_at.is_some());
    assert!(trade.size_crypto > rust_decimal::Decimal::ZERO);

    let stored = trades.find_by_id(&trade.id).await.unwrap();
    assert_eq!(stored.status, TradeStatus::Completed);
}
