//! Prometheus metrics for the observability surface (`server` feature).
//!
//! Grounded on `itsmontoya-scribble/src/bin/scribble-server/metrics.rs`:
//! a process-global registry behind a `OnceLock`, counters/gauges for HTTP
//! traffic, plus an `axum` middleware that records them, and a handler that
//! renders the registry in the Prometheus text exposition format.
//! Supplemented with pipeline-specific gauges for the health/metrics
//! surface that have no scribble-server equivalent: active workers and
//! events emitted.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::IntoResponse;
use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub active_workers: IntGauge,
    pub events_emitted_total: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            prometheus::Opts::new("http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )
        .expect("metric creation");
        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["method", "path"],
        )
        .expect("metric creation");
        let active_workers = IntGauge::new("active_workers", "Number of running stream workers")
            .expect("metric creation");
        let events_emitted_total = IntCounterVec::new(
            prometheus::Opts::new("events_emitted_total", "Total sound events emitted"),
            &["source", "group", "kind"],
        )
        .expect("metric creation");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("register metric");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("register metric");
        registry.register(Box::new(active_workers.clone())).expect("register metric");
        registry
            .register(Box::new(events_emitted_total.clone()))
            .expect("register metric");

        Self { registry, http_requests_total, http_request_duration_seconds, active_workers, events_emitted_total }
    }
}

/// Initialize the global metrics registry. Call once, at process start.
pub fn init() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

pub fn metrics() -> &'static Metrics {
    METRICS.get().expect("metrics::init called before metrics() access")
}

/// Set the `active_workers` gauge to the supervisor's current worker count.
pub fn set_active_workers(count: i64) {
    metrics().active_workers.set(count);
}

/// Increment `events_emitted_total` for one emitted start/stop event.
pub fn record_event(source_name: &str, group: &str, kind: &str) {
    metrics().events_emitted_total.with_label_values(&[source_name, group, kind]).inc();
}

/// `axum` handler rendering the registry in Prometheus text format.
pub async fn prometheus_metrics() -> impl IntoResponse {
    let metrics = metrics();
    let encoder = TextEncoder::new();
    let families = metrics.registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (StatusCode::OK, String::from_utf8_lossy(&buffer).into_owned())
}

/// `axum` middleware recording request count and latency.
pub async fn track_http_metrics(req: Request, next: Next) -> impl IntoResponse {
    let start = Instant::now();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let method = req.method().to_string();

    let response = next.run(req).await;

    let elapsed = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();
    let metrics = metrics();
    metrics
        .http_requests_total
        .with_label_values(&[&method, &path, &status])
        .inc();
    metrics
        .http_request_duration_seconds
        .with_label_values(&[&method, &path])
        .observe(elapsed);

    response
}

