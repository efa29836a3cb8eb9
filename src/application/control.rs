//! The control surface named in spec §6: a plain async trait, no transport
//! attached. Whatever inbound layer a deployment wants (HTTP, gRPC, CLI)
//! binds to this.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::application::ledger::Position;
use crate::domain::bot::Bot;
use crate::domain::errors::StoreError;
use crate::domain::signal::{Action, Temperature};
use crate::domain::trade::{Trade, TradeStatus};

pub struct BotStatusSnapshot {
    pub bot: Bot,
    pub last_action: Action,
    pub last_combined_score: rust_decimal::Decimal,
    pub temperature: Temperature,
    pub progress: rust_decimal::Decimal,
}

pub struct TradeFilters {
    pub bot_id: Option<String>,
    pub pair: Option<String>,
    pub status: Option<TradeStatus>,
    pub since: Option<DateTime<Utc>>,
}

pub struct PortfolioTotals {
    pub positions: Vec<(String, Position)>,
    pub realized_pnl: rust_decimal::Decimal,
    pub usd_invested: rust_decimal::Decimal,
}

#[async_trait]
pub trait ControlApi: Send + Sync {
    async fn create_bot(&self, bot: Bot) -> Result<String, StoreError>;
    async fn update_bot(&self, id: &str, patch: Bot) -> Result<(), StoreError>;
    async fn start_bot(&self, id: &str) -> Result<(), StoreError>;
    async fn stop_bot(&self, id: &str) -> Result<(), StoreError>;
    async fn emergency_stop(&self);
    async fn get_bot_status(&self, id: &str) -> Result<BotStatusSnapshot, StoreError>;
    async fn get_portfolio(&self) -> Result<PortfolioTotals, StoreError>;
    async fn get_trades(&self, filters: TradeFilters) -> Result<Vec<Trade>, StoreError>;
}
