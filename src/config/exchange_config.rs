//! Exchange credentials and endpoints, loaded from the environment. This
//! spec targets one exchange (Non-goal: multi-exchange), so this is a flat
//! struct rather than the teacher's per-broker config set.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub ws_url: String,
    /// Max age of a streamed ticker we'll still hand out without falling
    /// back to REST.
    pub ticker_ttl_seconds: i64,
    /// Beyond this age a ticker (streamed or REST) is refused outright with
    /// `StaleTicker` rather than handed to a caller as if current.
    pub max_staleness_seconds: i64,
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

impl ExchangeConfig {
    pub fn from_env(require_credentials: bool) -> Result<Self> {
        let api_key = env::var("EXCHANGE_API_KEY").unwrap_or_default();
        let api_secret = env::var("EXCHANGE_API_SECRET").unwrap_or_default();

        if require_credentials && (api_key.is_empty() || api_secret.is_empty()) {
            bail!("EXCHANGE_API_KEY and EXCHANGE_API_SECRET are required outside TRADING_MODE=test");
        }

        Ok(Self {
            api_key,
            api_secret,
            base_url: env::var("EXCHANGE_BASE_URL").unwrap_or_else(|_| "https://api.binance.com".to_string()),
            ws_url: env::var("EXCHANGE_WS_URL")
                .unwrap_or_else(|_| "wss://stream.binance.com:9443".to_string()),
            ticker_ttl_seconds: env_parse("TICKER_TTL_SECONDS", 10i64).context("TICKER_TTL_SECONDS")?,
            max_staleness_seconds: env_parse("MAX_STALENESS_SECONDS", 60i64).context("MAX_STALENESS_SECONDS")?,
        })
    }
}
