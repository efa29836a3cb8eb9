//! Tunables for the bot evaluation loop: cache freshness, event bus
//! backpressure, and the temperature display thresholds.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub event_bus_backlog: usize,
    pub candle_ttl_seconds: i64,
    pub stale_grace_seconds: i64,
    pub cache_capacity: usize,
    pub temperature_hot: Decimal,
    pub temperature_warm: Decimal,
    pub temperature_cool: Decimal,
    pub evaluation_interval_seconds: u64,
    /// How long `MockGateway` holds an order in `Open` before reporting it
    /// filled. Zero (the default) fills synchronously, which is what every
    /// test relying on immediate-fill semantics expects.
    pub mock_fill_delay_seconds: u64,
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

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            event_bus_backlog: env_parse("EVENT_BUS_BACKLOG", 256usize).context("EVENT_BUS_BACKLOG")?,
            candle_ttl_seconds: env_parse("CANDLE_TTL_SECONDS", 60i64).context("CANDLE_TTL_SECONDS")?,
            stale_grace_seconds: env_parse("STALE_GRACE_SECONDS", 300i64).context("STALE_GRACE_SECONDS")?,
            cache_capacity: env_parse("CACHE_CAPACITY", 512usize).context("CACHE_CAPACITY")?,
            temperature_hot: env_parse("TEMPERATURE_HOT", Decimal::new(80, 2)).context("TEMPERATURE_HOT")?,
            temperature_warm: env_parse("TEMPERATURE_WARM", Decimal::new(50, 2)).context("TEMPERATURE_WARM")?,
            temperature_cool: env_parse("TEMPERATURE_COOL", Decimal::new(20, 2)).context("TEMPERATURE_COOL")?,
            evaluation_interval_seconds: env_parse("EVALUATION_INTERVAL_SECONDS", 5u64)
                .context("EVALUATION_INTERVAL_SECONDS")?,
            mock_fill_delay_seconds: env_parse("MOCK_FILL_DELAY_SECONDS", 0u64)
                .context("MOCK_FILL_DELAY_SECONDS")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_order_hot_above_warm_above_cool() {
        let config = EngineConfig::from_env().unwrap();
        assert!(config.temperature_hot > config.temperature_warm);
        assert!(config.temperature_warm > config.temperature_cool);
    }
}
