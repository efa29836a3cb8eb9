//! An order the exchange does not fill within the immediate-fill probe
//! window stays `pending` and is handed off to the order monitor instead
//! of being reported as completed.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use tradeforge_engine::application::trading::decider::Sizing;
use tradeforge_engine::application::trading::executor::TradeExecutor;
use tradeforge_engine::application::trading::order_monitor::{OrderMonitor, OrderMonitorConfig};
use tradeforge_engine::domain::ports::ExchangeGateway;
use tradeforge_engine::domain::trade::{Side, TradeStatus};
use tradeforge_engine::infrastructure::event_bus::EventBus;
use tradeforge_engine::infrastructure::exchange::MockGateway;
use tradeforge_engine::infrastructure::mutex::InMemoryMutex;

#[tokio::test]
async fn order_that_never_fills_within_probe_window_stays_pending() {
    let (bots, trades) = common::fresh_repos().await;
    let bot = common::sample_bot("b1", "BTC-USD");
    bots.create(&bot).await.unwrap();

    // A fill delay well past the immediate-fill probe's ~5s window, so the
    // order is still `Open` by the time the probe gives up.
    let inner = MockGateway::with_fill_delay(dec!(10000), Duration::from_secs(60));
    inner.set_ticker("BTC-USD", dec!(40000)).await;
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(inner);

    let event_bus = Arc::new(EventBus::new(64));
    let mut rx = event_bus.subscribe("trade_status").await;

    let executor = TradeExecutor::new(
        gateway.clone(),
        Arc::new(InMemoryMutex::new()),
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

    let trade = executor
        .execute("b1", Side::Buy, Sizing { size_usd: dec!(50) }, None)
        .await
        .expect("placement succeeds even though the order stays open");

    assert_eq!(trade.status, TradeStatus::Pending);
    assert!(trade.order_id.is_some());

    let event = rx.recv().await.unwrap();
    match event {
        tradeforge_engine::domain::events::TradingEvent::TradeStatus { status, .. } => {
            assert_eq!(status, TradeStatus::Pending);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let stored = trades.find_by_id(&trade.id).await.unwrap();
    assert_eq!(stored.status, TradeStatus::Pending);
}
