//! Push-based reporting: this process never runs an HTTP server for metrics.
//! Instead it periodically logs a structured JSON snapshot (for Loki/Fluentd/
//! CloudWatch collection) and, if a pushgateway URL is configured, pushes the
//! Prometheus text exposition format there directly.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::metrics::Metrics;

pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    pushgateway_url: Option<String>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<Metrics>, pushgateway_url: Option<String>, interval: Duration) -> Self {
        Self {
            metrics,
            pushgateway_url,
            interval,
        }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            loop {
                tick.tick().await;
                self.report_once().await;
            }
        })
    }

    async fn report_once(&self) {
        let rendered = self.metrics.render();
        info!(target: "metrics", snapshot = %summarize(&rendered), "periodic metrics snapshot");

        if let Some(url) = &self.pushgateway_url {
            let client = reqwest::Client::new();
            if let Err(e) = client.post(url).body(rendered).send().await {
                warn!(error = %e, "failed to push metrics to pushgateway");
            }
        }
    }
}

/// Collapses the full Prometheus text exposition into a compact one-line
/// summary for the structured log line; the full detail stays in `/metrics`
/// scrapes, this is only for human-scannable log aggregation.
fn summarize(rendered: &str) -> String {
    rendered
        .lines()
        .filter(|l| !l.starts_with('#') && !l.is_empty())
        .count()
        .to_string()
        + " series"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn report_once_does_not_panic_without_pushgateway() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let reporter = MetricsReporter::new(metrics, None, Duration::from_secs(60));
        reporter.report_once().await;
    }
}
