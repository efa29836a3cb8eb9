//! Repository Pattern Abstractions
//!
//! Clean separation between business logic and the concrete persistence
//! backend: `BotRepository` and `TradeRepository` are typed, semantic access
//! to bots and trades. They do not leak schema to callers; the concrete
//! sqlx-backed implementation lives under `infrastructure::persistence`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::bot::Bot;
use crate::domain::errors::StoreError;
use crate::domain::trade::{Trade, TradeStatus};

#[async_trait]
pub trait BotRepository: Send + Sync {
    async fn create(&self, bot: &Bot) -> Result<(), StoreError>;
    async fn update(&self, bot: &Bot) -> Result<(), StoreError>;
    async fn get(&self, id: &str) -> Result<Bot, StoreError>;
    async fn list(&self) -> Result<Vec<Bot>, StoreError>;

    /// Atomically resets confirmation fields together with a config update,
    /// so a strategy change can never leave stale confirmation state.
    async fn update_config_and_reset_confirmation(&self, bot: &Bot) -> Result<(), StoreError>;

    /// Writes only `confirmation_start_at`/`last_action_being_confirmed`/
    /// `last_combined_score`/`last_evaluated_at` — the evaluator may never
    /// touch config fields.
    async fn update_evaluation_state(&self, bot: &Bot) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Inserts a new trade. Fails with `StoreError::DuplicateOrderId` if
    /// `order_id` is already present once known.
    async fn insert(&self, trade: &Trade) -> Result<(), StoreError>;

    /// Transitions a trade's status, failing the whole operation with
    /// `StoreError::Conflict` if the trade is not currently in
    /// `expected_status`. This is the serializable `pending -> terminal`
    /// guard that prevents double-fill races.
    async fn transition_status(
        &self,
        trade_id: &str,
        expected_status: TradeStatus,
        new_status: TradeStatus,
        order_id: Option<&str>,
        filled_price: Option<rust_decimal::Decimal>,
        filled_size: Option<rust_decimal::Decimal>,
        commission_usd: Option<rust_decimal::Decimal>,
        filled_at: Option<DateTime<Utc>>,
        /// The USD notional confirmed by the exchange for this fill; written
        /// over the pre-decision estimate when present.
        confirmed_size_usd: Option<rust_decimal::Decimal>,
    ) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Trade, StoreError>;
    async fn find_pending_for_bot(&self, bot_id: &str) -> Result<Vec<Trade>, StoreError>;
    async fn find_last_completed_for_bot(&self, bot_id: &str) -> Result<Option<Trade>, StoreError>;
    async fn find_completed_for_pair(&self, pair: &str) -> Result<Vec<Trade>, StoreError>;
    async fn find_pending_older_than(&self, age_seconds: i64) -> Result<Vec<Trade>, StoreError>;
    async fn find_by_filters(
        &self,
        bot_id: Option<&str>,
        pair: Option<&str>,
        status: Option<TradeStatus>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>, StoreError>;
}
