use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Completed => "completed",
            TradeStatus::Failed => "failed",
            TradeStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Pending)
    }
}

/// An immutable record of an attempted or executed order. `size_usd` is
/// always the authoritative USD value actually transacted; it is never
/// recomputed from `size_crypto * price` without honoring the exchange's
/// `size_in_quote` flag — that historical confusion cost the source system
/// orders of magnitude errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub order_id: Option<String>,
    pub triggered_by: String,
    pub product_id: String,
    pub side: Side,
    pub size_usd: Decimal,
    pub size_crypto: Decimal,
    pub price: Decimal,
    pub commission_usd: Decimal,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub signal_context: Option<serde_json::Value>,
}

impl Trade {
    pub fn new_pending(
        triggered_by: String,
        product_id: String,
        side: Side,
        size_usd: Decimal,
        size_crypto: Decimal,
        price: Decimal,
        signal_context: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: None,
            triggered_by,
            product_id,
            side,
            size_usd,
            size_crypto,
            price,
            commission_usd: Decimal::ZERO,
            status: TradeStatus::Pending,
            created_at: Utc::now(),
            filled_at: None,
            signal_context,
        }
    }

    /// `size_usd` must agree with `size_crypto * price` within one basis
    /// point once a fill is known (§8 invariant).
    pub fn sizes_reconcile(&self) -> bool {
        if self.price.is_zero() {
            return true;
        }
        let implied = self.size_crypto * self.price;
        let tolerance = self.size_usd.abs() * Decimal::new(1, 4); // 1 bps
        (implied - self.size_usd).abs() <= tolerance.max(Decimal::new(1, 2))
    }
}
