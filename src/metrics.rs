// src/metrics.rs
use anyhow::{Context, Result};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shuttle_axum::axum::{routing::get, Router};

use crate::config::ImporterConfig;

pub const ENV_METRICS_ENABLED: &str = "METRICS_ENABLED";

pub struct Metrics {
    pub handle: PrometheusHandle,
}

/// `METRICS_ENABLED=1` turns the Prometheus recorder and `/metrics` on.
pub fn metrics_enabled() -> bool {
    std::env::var(ENV_METRICS_ENABLED).is_ok_and(|v| v.trim() == "1")
}

impl Metrics {
    /// Install the Prometheus recorder and publish the active fetch limits.
    pub fn init(cfg: &ImporterConfig) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        gauge!("importer_request_timeout_secs").set(cfg.request_timeout_secs as f64);
        gauge!("importer_max_source_fetch").set(cfg.max_source_fetch as f64);
        gauge!("importer_fetch_concurrency").set(cfg.fetch_concurrency as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
