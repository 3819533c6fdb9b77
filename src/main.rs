//! IRB Profile Importer binary entrypoint.
//! Boots the Axum HTTP server with the profile registry and the importer.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use irb_profile_importer::metrics::{metrics_enabled, Metrics};
use irb_profile_importer::{router, AppState, Importer, ImporterConfig, ProfileRegistry};

/// Compact tracing logs. `RUST_LOG` wins over the built-in filter.
fn enable_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("irb_profile_importer=info,warn"));

    // Shuttle may already have installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_tracing();

    let cfg = ImporterConfig::load_default().context("load importer config")?;
    tracing::info!(
        target: "importer",
        timeout_secs = cfg.request_timeout_secs,
        max_sources = cfg.max_source_fetch,
        search = cfg.search_enabled,
        "importer config loaded"
    );

    let registry = ProfileRegistry::with_builtin().context("load built-in profiles")?;
    let importer = Importer::from_config(cfg.clone()).context("build importer")?;

    let state = AppState {
        registry: Arc::new(registry),
        importer: Arc::new(importer),
    };
    let mut app = router(state);

    if metrics_enabled() {
        let metrics = Metrics::init(&cfg)?;
        app = app.merge(metrics.router());
    }

    Ok(app.into())
}
