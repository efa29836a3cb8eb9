//! Observability configuration: this process only ever pushes metrics out
//! (structured logs, optional Prometheus pushgateway); it never runs an
//! inbound metrics HTTP server.

use std::env;

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    pub pushgateway_url: Option<String>,
    pub report_interval_seconds: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pushgateway_url: None,
            report_interval_seconds: 60,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("OBSERVABILITY_ENABLED")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(true),
            pushgateway_url: env::var("OBSERVABILITY_PUSHGATEWAY_URL").ok(),
            report_interval_seconds: env::var("OBSERVABILITY_REPORT_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_observability_without_a_pushgateway() {
        let config = ObservabilityConfig::default();
        assert!(config.enabled);
        assert!(config.pushgateway_url.is_none());
    }
}
