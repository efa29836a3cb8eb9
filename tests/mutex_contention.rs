//! Two concurrent execution attempts for the same bot must not both reach
//! the exchange: the distributed mutex admits exactly one, the other is
//! rejected as busy rather than placing a second order.

mod common;

use std::sync::Arc;

use rust_decimal_macros::dec;

use tradeforge_engine::application::trading::decider::Sizing;
use tradeforge_engine::application::trading::executor::TradeExecutor;
use tradeforge_engine::application::trading::order_monitor::{OrderMonitor, OrderMonitorConfig};
use tradeforge_engine::domain::errors::TradeError;
use tradeforge_engine::domain::trade::Side;
use tradeforge_engine::infrastructure::event_bus::EventBus;
use tradeforge_engine::infrastructure::exchange::MockGateway;
use tradeforge_engine::infrastructure::mutex::InMemoryMutex;

#[tokio::test]
async fn second_concurrent_execution_for_same_bot_is_rejected_as_busy() {
    let (bots, trades) = common::fresh_repos().await;
    let bot = common::sample_bot("b1", "BTC-USD");
    bots.create(&bot).await.unwrap();

    let gateway = Arc::new(MockGateway::default());
    gateway.set_ticker("BTC-USD", dec!(40000)).await;
    let event_bus = Arc::new(EventBus::new(64));

    // Both executors share one mutex instance, racing for the same
    // bot_id lock key; the mock gateway's immediate-fill probe holds the
    // winner's lock for ~500ms, giving the loser time to collide with it.
    let shared_mutex = Arc::new(InMemoryMutex::new());
    let build_executor = || {
        TradeExecutor::new(
            gateway.clone(),
            shared_mutex.clone(),
            bots.clone(),
            trades.clone(),
            event_bus.clone(),
            Arc::new(OrderMonitor::new(
                gateway.clone(),
                trades.clone(),
                event_bus.clone(),
                OrderMonitorConfig::default(),
            )),
        )
    };
    let executor_a = Arc::new(build_executor());
    let executor_b = Arc::new(build_executor());

    let a = tokio::spawn(async move {
        executor_a
            .execute("b1", Side::Buy, Sizing { size_usd: dec!(50) }, None)
            .await
    });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let b = executor_b
        .execute("b1", Side::Buy, Sizing { size_usd: dec!(50) }, None)
        .await;

    let a_result = a.await.unwrap();
    assert!(a_result.is_ok(), "first execution should hold the lock and succeed");
    assert!(matches!(b, Err(TradeError::Busy { ref bot_id }) if bot_id == "b1"));
}
