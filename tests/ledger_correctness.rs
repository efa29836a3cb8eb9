//! The portfolio ledger reconstructs position and realized P&L purely from
//! the persisted trade history — no separate running balance to drift out
//! of sync with it.

mod common;

use rust_decimal_macros::dec;

use tradeforge_engine::application::ledger::PortfolioLedger;
use tradeforge_engine::domain::trade::{Side, Trade, TradeStatus};

fn completed(side: Side, size_usd: rust_decimal::Decimal, size_crypto: rust_decimal::Decimal, price: rust_decimal::Decimal) -> Trade {
    let mut t = Trade::new_pending("bot:b1".to_string(), "BTC-USD".to_string(), side, size_usd, size_crypto, price, None);
    t.status = TradeStatus::Completed;
    t.filled_at = Some(chrono::Utc::now());
    t
}

#[tokio::test]
async fn ledger_reflects_fifo_realized_pnl_across_persisted_trades() {
    let (_bots, trades) = common::fresh_repos().await;

    let buy1 = completed(Side::Buy, dec!(400), dec!(0.01), dec!(40000));
    let buy2 = completed(Side::Buy, dec!(500), dec!(0.01), dec!(50000));
    let sell = completed(Side::Sell, dec!(600), dec!(0.01), dec!(60000));

    trades.insert(&buy1).await.unwrap();
    trades.insert(&buy2).await.unwrap();
    trades.insert(&sell).await.unwrap();

    let history = trades.find_completed_for_pair("BTC-USD").await.unwrap();
    assert_eq!(history.len(), 3);

    let position = PortfolioLedger::position(&history);
    // Sell consumes the oldest lot (bought at 40000) first: realized pnl
    // is (60000 - 40000) * 0.01 = 200.
    assert_eq!(position.realized_pnl, dec!(200));
    assert_eq!(position.crypto_balance, dec!(0.01));
    assert_eq!(position.average_cost, dec!(50000));
}

#[tokio::test]
async fn ledger_ignores_pending_and_failed_trades() {
    let (_bots, trades) = common::fresh_repos().await;

    let mut pending = completed(Side::Buy, dec!(400), dec!(0.01), dec!(40000));
    pending.status = TradeStatus::Pending;
    pending.filled_at = None;
    trades.insert(&pending).await.unwrap();

    let history = trades.find_completed_for_pair("BTC-USD").await.unwrap();
    assert!(history.is_empty());

    let position = PortfolioLedger::position(&history);
    assert_eq!(position.crypto_balance, rust_decimal::Decimal::ZERO);
}
