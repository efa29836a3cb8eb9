use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the exchange gateway.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transient exchange error: {reason}")]
    Transient { reason: String },

    #[error("rate limited: would exceed call deadline")]
    RateLimited,

    #[error("ticker for {pair} stale beyond max_staleness")]
    StaleTicker { pair: String },

    #[error("exchange authentication failed: {reason}")]
    Auth { reason: String },
}

/// Errors surfaced while deciding on or executing a trade.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("another trade in progress for {bot_id}")]
    Busy { bot_id: String },

    #[error("order placement failed: {reason}")]
    Execution { reason: String },

    #[error("order placed ({order_id}) but status could not be confirmed: {reason}")]
    PostPlacementReconciliation { order_id: String, reason: String },

    #[error("insufficient balance: need {need}, available {available}")]
    InsufficientBalance { need: Decimal, available: Decimal },

    #[error("cooldown active: {remaining_secs}s remaining")]
    CooldownActive { remaining_secs: i64 },

    #[error("pending order already exists for {bot_id}")]
    PendingOrderExists { bot_id: String },

    #[error("bot is not running")]
    BotNotRunning,

    #[error("emergency stop is active")]
    EmergencyStop,

    #[error("sell size below exchange minimum for {pair}")]
    BelowMinSell { pair: String },

    #[error("confirmation not yet reached")]
    Confirming,
}

/// Errors surfaced by the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("trade status conflict: expected {expected}, found {actual}")]
    Conflict { expected: String, actual: String },

    #[error("duplicate order_id: {order_id}")]
    DuplicateOrderId { order_id: String },

    #[error("bot not found: {bot_id}")]
    BotNotFound { bot_id: String },

    #[error("unrecoverable store error: {reason}")]
    Fatal { reason: String },
}

/// Verbatim, user-visible reason codes surfaced by `TradeDecider` gates.
/// These strings are part of the control-API contract; never replace them
/// with a generic message.
pub mod reason_codes {
    pub const INSUFFICIENT_BALANCE: &str = "insufficient_balance";
    pub const COOLDOWN_ACTIVE: &str = "cooldown_active";
    pub const PENDING_ORDER_EXISTS: &str = "pending_order_exists";
    pub const CONFIRMING: &str = "confirming";
    pub const EMERGENCY_STOP: &str = "emergency_stop";
    pub const BOT_NOT_RUNNING: &str = "bot_not_running";
    pub const BELOW_MIN_SELL: &str = "below_min_sell";
    pub const DAILY_LOSS_CAP: &str = "daily_loss_cap";
    pub const DAILY_TRADE_CAP: &str = "daily_trade_cap";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_error_formatting_is_verbatim_and_stable() {
        let e = TradeError::CooldownActive { remaining_secs: 42 };
        assert_eq!(e.to_string(), "cooldown active: 42s remaining");
    }

    #[test]
    fn store_conflict_names_expected_and_actual() {
        let e = StoreError::Conflict {
            expected: "pending".into(),
            actual: "completed".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("pending"));
        assert!(msg.contains("completed"));
    }
}
