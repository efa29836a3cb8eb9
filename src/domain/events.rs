use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::trade::{Trade, TradeStatus};

/// Events fanned out on the `EventBus`. One variant per topic family;
/// `Ticker` alone is parameterized per-pair (topic `ticker.<pair>`), the
/// rest map onto fixed topics (`trade_status`, `pending_order`,
/// `sync_issue`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TradingEvent {
    Ticker {
        pair: String,
        price: Decimal,
        timestamp: DateTime<Utc>,
    },
    TradeStatus {
        trade_id: String,
        order_id: Option<String>,
        bot_id: String,
        status: TradeStatus,
    },
    PendingOrder {
        trade_id: String,
        order_id: String,
        bot_id: String,
    },
    SyncIssue {
        trade_id: String,
        reason: String,
    },
}

impl TradingEvent {
    /// The topic this event belongs to, used for EventBus routing and stats.
    pub fn topic(&self) -> String {
        match self {
            TradingEvent::Ticker { pair, .. } => format!("ticker.{pair}"),
            TradingEvent::TradeStatus { .. } => "trade_status".to_string(),
            TradingEvent::PendingOrder { .. } => "pending_order".to_string(),
            TradingEvent::SyncIssue { .. } => "sync_issue".to_string(),
        }
    }

    pub fn trade_status(trade: &Trade, bot_id: impl Into<String>) -> Self {
        TradingEvent::TradeStatus {
            trade_id: trade.id.clone(),
            order_id: trade.order_id.clone(),
            bot_id: bot_id.into(),
            status: trade.status,
        }
    }
}
