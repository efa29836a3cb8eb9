//! Headless trading engine entrypoint.
//!
//! Wires configuration, the exchange gateway (live Binance REST/WS, or a
//! mock when `TRADING_MODE=test`), persistence, the distributed mutex, and
//! the application bootstrap, then runs until `Ctrl+C`. Metrics are
//! push-based only: a periodic log snapshot, plus an optional Prometheus
//! pushgateway POST. This process never opens an inbound HTTP listener.
//!
//! # Environment
//! - `TRADING_MODE` - `live` or `test` (default `test`)
//! - `TRADING_PAIRS` - comma-separated pairs, e.g. `BTC-USD,ETH-USD`
//! - `REDIS_URL` - if set, bot-execution locking uses Redis; otherwise an
//!   in-process mutex is used (fine for a single worker, not for a fleet)
//!
//! # Exit codes
//! - `0` - clean shutdown
//! - `1` - configuration error
//! - `2` - exchange authentication failure on startup
//! - `3` - persistent store failure on startup

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tracing::{Level, error, info};
use tracing_subscriber::prelude::*;

use tradeforge_engine::application::bootstrap::Application;
use tradeforge_engine::config::{Config, TradingMode};
use tradeforge_engine::domain::errors::ExchangeError;
use tradeforge_engine::domain::ports::{Clock, DistributedMutex, ExchangeGateway, SystemClock};
use tradeforge_engine::infrastructure::exchange::{BinanceGateway, MockGateway};
use tradeforge_engine::infrastructure::mutex::{InMemoryMutex, RedisMutex};
use tradeforge_engine::infrastructure::observability::{Metrics, MetricsReporter};
use tradeforge_engine::infrastructure::persistence::{Database, SqliteBotRepository, SqliteTradeRepository};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "trading engine starting");

    let exit_code = match run().await {
        Ok(()) => 0,
        Err(StartupError::Config(e)) => {
            error!(error = %e, "configuration error");
            1
        }
        Err(StartupError::ExchangeAuth(e)) => {
            error!(error = %e, "exchange authentication failed");
            2
        }
        Err(StartupError::Store(e)) => {
            error!(error = %e, "persistent store failure");
            3
        }
    };

    std::process::exit(exit_code);
}

enum StartupError {
    Config(anyhow::Error),
    ExchangeAuth(anyhow::Error),
    Store(anyhow::Error),
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env().map_err(StartupError::Config)?;
    info!(mode = ?config.trading_mode, pairs = ?config.pairs, "configuration loaded");

    let gateway: Arc<dyn ExchangeGateway> = match config.trading_mode {
        TradingMode::Live => Arc::new(BinanceGateway::new(
            config.exchange.api_key.clone(),
            config.exchange.api_secret.clone(),
            config.exchange.base_url.clone(),
            config.exchange.ws_url.clone(),
            config.exchange.ticker_ttl_seconds,
            config.exchange.max_staleness_seconds,
        )),
        TradingMode::Test => Arc::new(MockGateway::with_fill_delay(
            dec!(10000),
            Duration::from_secs(config.engine.mock_fill_delay_seconds),
        )),
    };

    if config.trading_mode == TradingMode::Live {
        gateway
            .get_accounts()
            .await
            .map_err(startup_auth_error)
            .map_err(StartupError::ExchangeAuth)?;
    }

    let database = Database::new(&config.database.url)
        .await
        .map_err(StartupError::Store)?;
    let bots = Arc::new(SqliteBotRepository::new(database.pool.clone()));
    let trades = Arc::new(SqliteTradeRepository::new(database.pool.clone()));

    let mutex: Arc<dyn DistributedMutex> = match std::env::var("REDIS_URL") {
        Ok(url) => {
            info!("using Redis-backed distributed mutex");
            Arc::new(RedisMutex::new(&url).map_err(StartupError::Config)?)
        }
        Err(_) => {
            info!("using in-process mutex (single-worker only)");
            Arc::new(InMemoryMutex::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let app = Arc::new(Application::build(&config, gateway, mutex, bots, trades, clock));

    let handle = app
        .start(&config.pairs)
        .await
        .map_err(StartupError::ExchangeAuth)?;

    if config.observability.enabled {
        let metrics = Arc::new(Metrics::new().map_err(StartupError::Config)?);
        let reporter = Arc::new(MetricsReporter::new(
            metrics,
            config.observability.pushgateway_url.clone(),
            std::time::Duration::from_secs(config.observability.report_interval_seconds),
        ));
        reporter.spawn();
        info!(
            interval_seconds = config.observability.report_interval_seconds,
            "metrics reporter started"
        );
    } else {
        info!("metrics reporting disabled");
    }

    info!("engine running, press Ctrl+C to shut down");
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");

    handle.sweeper_task.abort();
    handle.periodic_eval_task.abort();
    for t in handle.ticker_tasks {
        t.abort();
    }

    Ok(())
}

fn startup_auth_error(e: ExchangeError) -> anyhow::Error {
    match e {
        ExchangeError::Auth { reason } => anyhow::anyhow!("exchange rejected credentials: {reason}"),
        other => anyhow::anyhow!(other),
    }
}
