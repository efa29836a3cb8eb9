//! Prometheus metrics for the trading engine.
//!
//! All metrics use the `engine_` prefix and are read-only from the caller's
//! perspective; every setter lives on this struct.

use std::sync::Arc;

use prometheus::{
    CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
};

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub portfolio_value_usd: GenericGauge<AtomicF64>,
    pub portfolio_realized_pnl_usd: GenericGauge<AtomicF64>,
    pub position_value_usd: GenericGaugeVec<AtomicF64>,
    pub bots_running: GenericGauge<AtomicF64>,
    pub pending_trades: GenericGauge<AtomicF64>,
    pub trades_total: CounterVec,
    pub circuit_breaker_status: GaugeVec,
    pub api_latency_seconds: HistogramVec,
    pub websocket_reconnects_total: CounterVec,
    pub cache_hits_total: CounterVec,
    pub cache_misses_total: CounterVec,
    pub event_bus_dropped_total: GenericGauge<AtomicF64>,
    pub mutex_contention_total: CounterVec,
    pub sync_issues_total: CounterVec,
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let portfolio_value_usd =
            Gauge::with_opts(Opts::new("engine_portfolio_value_usd", "Total portfolio value in USD"))?;
        registry.register(Box::new(portfolio_value_usd.clone()))?;

        let portfolio_realized_pnl_usd = Gauge::with_opts(Opts::new(
            "engine_portfolio_realized_pnl_usd",
            "Realized P&L across all bots in USD",
        ))?;
        registry.register(Box::new(portfolio_realized_pnl_usd.clone()))?;

        let position_value_usd = GaugeVec::new(
            Opts::new("engine_position_value_usd", "Position value per pair in USD"),
            &["pair"],
        )?;
        registry.register(Box::new(position_value_usd.clone()))?;

        let bots_running = Gauge::with_opts(Opts::new("engine_bots_running", "Number of bots currently running"))?;
        registry.register(Box::new(bots_running.clone()))?;

        let pending_trades = Gauge::with_opts(Opts::new("engine_pending_trades", "Number of trades awaiting a fill"))?;
        registry.register(Box::new(pending_trades.clone()))?;

        let trades_total = CounterVec::new(
            Opts::new("engine_trades_total", "Total trades by side and terminal status"),
            &["side", "status"],
        )?;
        registry.register(Box::new(trades_total.clone()))?;

        let circuit_breaker_status = GaugeVec::new(
            Opts::new("engine_circuit_breaker_status", "Circuit breaker state (0=closed, 1=open, 2=half-open)"),
            &["name"],
        )?;
        registry.register(Box::new(circuit_breaker_status.clone()))?;

        let api_latency_seconds = HistogramVec::new(
            HistogramOpts::new("engine_api_latency_seconds", "Exchange REST call latency in seconds")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["endpoint"],
        )?;
        registry.register(Box::new(api_latency_seconds.clone()))?;

        let websocket_reconnects_total = CounterVec::new(
            Opts::new("engine_websocket_reconnects_total", "Total exchange websocket reconnection attempts"),
            &["exchange"],
        )?;
        registry.register(Box::new(websocket_reconnects_total.clone()))?;

        let cache_hits_total = CounterVec::new(
            Opts::new("engine_cache_hits_total", "Market data cache hits"),
            &["pair"],
        )?;
        registry.register(Box::new(cache_hits_total.clone()))?;

        let cache_misses_total = CounterVec::new(
            Opts::new("engine_cache_misses_total", "Market data cache misses"),
            &["pair"],
        )?;
        registry.register(Box::new(cache_misses_total.clone()))?;

        let event_bus_dropped_total =
            Gauge::with_opts(Opts::new("engine_event_bus_dropped_total", "Events dropped due to a full topic backlog"))?;
        registry.register(Box::new(event_bus_dropped_total.clone()))?;

        let mutex_contention_total = CounterVec::new(
            Opts::new("engine_mutex_contention_total", "Distributed mutex acquisitions that found the lock already held"),
            &["bot_id"],
        )?;
        registry.register(Box::new(mutex_contention_total.clone()))?;

        let sync_issues_total = CounterVec::new(
            Opts::new("engine_sync_issues_total", "Reconciliation sweeper sync issues by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(sync_issues_total.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new("engine_uptime_seconds", "Process uptime in seconds"))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            portfolio_value_usd,
            portfolio_realized_pnl_usd,
            position_value_usd,
            bots_running,
            pending_trades,
            trades_total,
            circuit_breaker_status,
            api_latency_seconds,
            websocket_reconnects_total,
            cache_hits_total,
            cache_misses_total,
            event_bus_dropped_total,
            mutex_contention_total,
            sync_issues_total,
            uptime_seconds,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }

    pub fn set_position_value(&self, pair: &str, value: f64) {
        self.position_value_usd.with_label_values(&[pair]).set(value);
    }

    pub fn inc_trades(&self, side: &str, status: &str) {
        self.trades_total.with_label_values(&[side, status]).inc();
    }

    pub fn observe_api_latency(&self, endpoint: &str, latency_secs: f64) {
        self.api_latency_seconds.with_label_values(&[endpoint]).observe(latency_secs);
    }

    pub fn inc_reconnects(&self, exchange: &str) {
        self.websocket_reconnects_total.with_label_values(&[exchange]).inc();
    }

    pub fn inc_cache_hit(&self, pair: &str) {
        self.cache_hits_total.with_label_values(&[pair]).inc();
    }

    pub fn inc_cache_miss(&self, pair: &str) {
        self.cache_misses_total.with_label_values(&[pair]).inc();
    }

    pub fn inc_mutex_contention(&self, bot_id: &str) {
        self.mutex_contention_total.with_label_values(&[bot_id]).inc();
    }

    pub fn inc_sync_issue(&self, reason: &str) {
        self.sync_issues_total.with_label_values(&[reason]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to construct default Metrics registry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_render_contains_prefix() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.render().contains("engine_"));
    }

    #[test]
    fn position_value_is_labeled_per_pair() {
        let metrics = Metrics::new().unwrap();
        metrics.set_position_value("BTC-USD", 10000.0);
        metrics.set_position_value("ETH-USD", 8000.0);
        let output = metrics.render();
        assert!(output.contains("BTC-USD"));
        assert!(output.contains("ETH-USD"));
    }

    #[test]
    fn trades_counter_increments_by_label() {
        let metrics = Metrics::new().unwrap();
        metrics.inc_trades("buy", "completed");
        metrics.inc_trades("sell", "failed");
        assert!(metrics.render().contains("engine_trades_total"));
    }
}
