// tests/metrics.rs
//
// The Prometheus recorder is process-global; this file is its own test binary
// and installs it exactly once.

mod common;

use std::sync::Arc;

use shuttle_axum::axum::body::{self, Body};
use shuttle_axum::axum::http::{Request, StatusCode};
use tower::ServiceExt;

use common::{importer_with, test_config, Reply, ScriptedTransport, StaticResolver};
use irb_profile_importer::metrics::Metrics;
use irb_profile_importer::ImportRequest;

#[tokio::test]
async fn metrics_endpoint_contains_importer_series() {
    let cfg = test_config().sanitized();
    let metrics = Metrics::init(&cfg).expect("install recorder");

    let t = Arc::new(
        ScriptedTransport::new()
            .route("https://example.edu/irb", Reply::redirect(301, "/irb/"))
            .route("https://example.edu/irb/", Reply::html("<p>IRB</p>")),
    );
    let importer = importer_with(cfg, t, StaticResolver::public());
    importer
        .import_profile(ImportRequest {
            organization_name: "Example University".into(),
            irb_page_url: "https://example.edu/irb".into(),
            organization_website: "http://localhost/".into(),
            ..ImportRequest::default()
        })
        .await
        .expect("import");

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap(); // 1 MiB
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "importer_imports_total",
        "importer_fetch_total",
        "importer_blocked_urls_total",
        "importer_redirects_total",
        "importer_import_ms",
        "importer_fetch_concurrency",
    ] {
        assert!(text.contains(needle), "missing series {needle} in:\n{text}");
    }
    assert!(text.contains(r#"outcome="fetched""#));
    assert!(text.contains(r#"outcome="failed""#));
}
