//! Configuration, organized by domain: exchange, engine, risk, database,
//! and observability, each loaded from its own `from_env()` and composed
//! here into one `Config`.

mod database_config;
mod engine_config;
mod exchange_config;
mod observability_config;
mod risk_config;

pub use database_config::DatabaseConfig;
pub use engine_config::EngineConfig;
pub use exchange_config::ExchangeConfig;
pub use observability_config::ObservabilityConfig;
pub use risk_config::RiskConfig;

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

/// Selects the exchange gateway implementation. `Test` never touches the
/// network; it is what scenario tests and local runs without credentials
/// use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Live,
    Test,
}

impl FromStr for TradingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(TradingMode::Live),
            "test" => Ok(TradingMode::Test),
            _ => bail!("invalid TRADING_MODE: {s}, must be 'live' or 'test'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub trading_mode: TradingMode,
    pub pairs: Vec<String>,
    pub exchange: ExchangeConfig,
    pub engine: EngineConfig,
    pub risk: RiskConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let trading_mode_str = env::var("TRADING_MODE").unwrap_or_else(|_| "test".to_string());
        let trading_mode = TradingMode::from_str(&trading_mode_str)?;

        let pairs = env::var("TRADING_PAIRS")
            .unwrap_or_else(|_| "BTC-USD".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let exchange = ExchangeConfig::from_env(trading_mode == TradingMode::Live)
            .context("failed to load exchange configuration")?;
        let engine = EngineConfig::from_env().context("failed to load engine configuration")?;
        let risk = RiskConfig::from_env().context("failed to load risk configuration")?;
        let database = DatabaseConfig::from_env();
        let observability = ObservabilityConfig::from_env();

        Ok(Self {
            trading_mode,
            pairs,
            exchange,
            engine,
            risk,
            database,
            observability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trading_mode_defaults_to_test_without_env() {
        // SAFETY: test-only process-wide env mutation, no concurrent test reads this var.
        unsafe {
            std::env::remove_var("TRADING_MODE");
        }
        let config = Config::from_env().expect("test mode never requires credentials");
        assert_eq!(config.trading_mode, TradingMode::Test);
    }

    #[test]
    fn invalid_trading_mode_is_rejected() {
        assert!(TradingMode::from_str("paper").is_err());
    }
}
