//! PortfolioLedger: exposes portfolio state as a pure function of trades.
//!
//! Unlike a weighted-average position tracker, this ledger matches realized
//! P&L FIFO: each sell consumes the oldest outstanding buy lots at their
//! original prices. It holds no mutable state of its own — every call
//! re-scans the trade log handed to it.

use rust_decimal::Decimal;

use crate::domain::trade::{Side, Trade, TradeStatus};

#[derive(Debug, Clone, Copy)]
struct Lot {
    size_crypto: Decimal,
    price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataIntegrity {
    Ok,
    Suspicious,
}

#[derive(Debug, Clone, Copy)]
pub struct Position {
    pub crypto_balance: Decimal,
    pub usd_invested: Decimal,
    pub average_cost: Decimal,
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        (current_price - self.average_cost) * self.crypto_balance
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Totals {
    pub realized_pnl: Decimal,
    pub usd_invested: Decimal,
}

pub struct PortfolioLedger;

impl PortfolioLedger {
    /// Scans `completed` trades for `pair`, in timestamp order, and derives
    /// the current position via FIFO lot matching. Trades not in
    /// `completed` status are ignored entirely — pending/failed/cancelled
    /// trades never affect the ledger.
    pub fn position(trades_for_pair: &[Trade]) -> Position {
        let mut ordered: Vec<&Trade> = trades_for_pair
            .iter()
            .filter(|t| t.status == TradeStatus::Completed)
            .collect();
        ordered.sort_by_key(|t| t.filled_at.unwrap_or(t.created_at));

        let mut lots: Vec<Lot> = Vec::new();
        let mut realized_pnl = Decimal::ZERO;
        let mut usd_invested = Decimal::ZERO;

        for t in ordered {
            match t.side {
                Side::Buy => {
                    lots.push(Lot {
                        size_crypto: t.size_crypto,
                        price: t.price,
                    });
                    usd_invested += t.size_usd;
                }
                Side::Sell => {
                    let mut remaining = t.size_crypto;
                    usd_invested -= t.size_usd;
                    while remaining > Decimal::ZERO {
                        let Some(lot) = lots.first_mut() else {
                            break;
                        };
                        let consumed = remaining.min(lot.size_crypto);
                        realized_pnl += consumed * (t.price - lot.price);
                        lot.size_crypto -= consumed;
                        remaining -= consumed;
                        if lot.size_crypto.is_zero() {
                            lots.remove(0);
                        }
                    }
                }
            }
        }

        let crypto_balance: Decimal = lots.iter().map(|l| l.size_crypto).sum();
        let total_cost: Decimal = lots.iter().map(|l| l.size_crypto * l.price).sum();
        let average_cost = if crypto_balance.is_zero() {
            Decimal::ZERO
        } else {
            total_cost / crypto_balance
        };

        Position {
            crypto_balance,
            usd_invested,
            average_cost,
            realized_pnl,
        }
    }

    pub fn totals(positions: &[Position]) -> Totals {
        positions.iter().fold(Totals::default(), |mut acc, p| {
            acc.realized_pnl += p.realized_pnl;
            acc.usd_invested += p.usd_invested;
            acc
        })
    }

    /// Cross-checks derived buy totals against a ground-truth deposit
    /// figure. `Σ buy.size_usd ≤ max(2 × known_deposits_usd,
    /// known_deposits_usd + 100)`.
    pub fn validate(all_completed_trades: &[Trade], known_deposits_usd: Decimal) -> DataIntegrity {
        let total_buys: Decimal = all_completed_trades
            .iter()
            .filter(|t| t.status == TradeStatus::Completed && t.side == Side::Buy)
            .map(|t| t.size_usd)
            .sum();
        let ceiling =
            (known_deposits_usd * Decimal::TWO).max(known_deposits_usd + Decimal::from(100));
        if total_buys <= ceiling {
            DataIntegrity::Ok
        } else {
            DataIntegrity::Suspicious
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn completed_trade(side: Side, size_usd: Decimal, size_crypto: Decimal, price: Decimal) -> Trade {
        Trade {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: Some(uuid::Uuid::new_v4().to_string()),
            triggered_by: "bot:B1".to_string(),
            product_id: "BTC-USD".to_string(),
            side,
            size_usd,
            size_crypto,
            price,
            commission_usd: Decimal::ZERO,
            status: TradeStatus::Completed,
            created_at: Utc::now(),
            filled_at: Some(Utc::now()),
            signal_context: None,
        }
    }

    #[test]
    fn ledger_correctness_scenario() {
        let trades = vec![
            completed_trade(Side::Buy, dec!(400), dec!(0.01), dec!(40000)),
            completed_trade(Side::Buy, dec!(500), dec!(0.01), dec!(50000)),
            completed_trade(Side::Sell, dec!(600), dec!(0.01), dec!(60000)),
        ];
        let position = PortfolioLedger::position(&trades);
        assert_eq!(position.realized_pnl, dec!(200));
        assert_eq!(position.crypto_balance, dec!(0.01));
        assert_eq!(position.average_cost, dec!(50000));
        assert_eq!(position.unrealized_pnl(dec!(55000)), dec!(50));
    }

    #[test]
    fn crypto_balance_equals_buys_minus_sells() {
        let trades = vec![
            completed_trade(Side::Buy, dec!(400), dec!(0.01), dec!(40000)),
            completed_trade(Side::Sell, dec!(200), dec!(0.004), dec!(50000)),
        ];
        let position = PortfolioLedger::position(&trades);
        assert_eq!(position.crypto_balance, dec!(0.006));
    }

    #[test]
    fn pending_trades_are_ignored() {
        let mut pending = completed_trade(Side::Buy, dec!(400), dec!(0.01), dec!(40000));
        pending.status = TradeStatus::Pending;
        let position = PortfolioLedger::position(&[pending]);
        assert_eq!(position.crypto_balance, Decimal::ZERO);
    }
}
