//! Global safety-gate limits and the known-deposits baseline the ledger
//! validates actual balances against.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub max_daily_loss_usd: Decimal,
    pub max_daily_trades: u32,
    pub known_deposits_usd: Decimal,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v.parse::<T>().map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

impl RiskConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_daily_loss_usd: env_parse("MAX_DAILY_LOSS_USD", Decimal::new(50000, 2))
                .context("MAX_DAILY_LOSS_USD")?,
            max_daily_trades: env_parse("MAX_DAILY_TRADES", 20u32).context("MAX_DAILY_TRADES")?,
            known_deposits_usd: env_parse("KNOWN_DEPOSITS_USD", Decimal::ZERO).context("KNOWN_DEPOSITS_USD")?,
        })
    }
}
