//! `camwatch` daemon entrypoint.
//!
//! Grounded on `itsmontoya-scribble/src/bin/scribble-server/main.rs`: clap
//! arguments parsed up front, logging initialized first thing, an `axum`
//! router with `/healthz` and `/metrics` behind `TraceLayer`, served from a
//! `#[tokio::main]` runtime. Unlike scribble-server (whose whole workload is
//! the HTTP surface), camwatch's actual pipeline — the Supervisor and its
//! stream workers — runs on plain OS threads; the Tokio runtime here exists
//! only to host the observability HTTP surface and the signal-driven
//! shutdown, the shape `brew-lab-thaumic-cast`'s headless server uses for
//! its own background-thread-plus-thin-async-surface daemon.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use camwatch::config::Config;
use camwatch::inference::NullEngine;
use camwatch::metrics;
use camwatch::shutdown::Shutdown;
use camwatch::sink::Sink;
use camwatch::sink::csv_audit::CsvAuditLog;
use camwatch::sink::publisher::MqttPublisher;
use camwatch::summary;
use camwatch::supervisor::Supervisor;
use camwatch::taxonomy::Taxonomy;

#[derive(Parser, Debug)]
#[command(name = "camwatch", about = "Acoustic event detection for networked camera audio streams")]
struct Params {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "/etc/camwatch/config.yaml")]
    config: PathBuf,

    /// Path to the class taxonomy CSV file (`index,class_name`).
    #[arg(long, default_value = "/etc/camwatch/taxonomy.csv")]
    taxonomy: PathBuf,

    /// Address the health/metrics HTTP surface binds to.
    #[arg(long, default_value = "0.0.0.0:9107")]
    bind: String,
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

fn build_router() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .layer(axum::middleware::from_fn(metrics::track_http_metrics))
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let params = Params::parse();

    let config = Config::load(&params.config)?;
    camwatch::logging::init(config.log_level);
    metrics::init();

    info!(path = %params.config.display(), "loaded configuration");

    let taxonomy = Arc::new(Taxonomy::load_csv(&params.taxonomy)?);
    let config = Arc::new(config);

    let startup_stamp = chrono::Local::now().format("%Y%m%d-%H%M").to_string();
    let audit_path = CsvAuditLog::path_for(std::path::Path::new(&config.log_dir), &startup_stamp);
    let audit_log = Arc::new(CsvAuditLog::new(audit_path));

    let publisher: Arc<dyn camwatch::sink::publisher::PublishSink> = Arc::new(MqttPublisher::connect(&config.mqtt));
    let sink = Arc::new(Sink::new(publisher, audit_log, &config.mqtt));

    let shutdown = Shutdown::new();

    let supervisor = Arc::new(Supervisor::new(config.clone(), taxonomy, || Ok(NullEngine), sink, shutdown.clone()));
    supervisor.start_all()?;

    {
        let supervisor = supervisor.clone();
        std::thread::spawn(move || supervisor.run_liveness_loop());
    }
    {
        let event_engines = supervisor.event_engines();
        let source_names: Vec<String> = config.sources.iter().map(|s| s.name.clone()).collect();
        let shutdown = shutdown.clone();
        let interval = std::time::Duration::from_secs(config.summary_interval * 60);
        std::thread::spawn(move || summary::run_loop(event_engines, source_names, interval, shutdown));
    }

    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            shutdown.set();
        })?;
    }

    let listener = tokio::net::TcpListener::bind(&params.bind).await?;
    info!(addr = %params.bind, "health/metrics surface listening");

    let app = build_router();
    let server_shutdown = shutdown.clone();
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !server_shutdown.is_set() {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        })
        .await;

    if let Err(e) = serve_result {
        error!(error = %e, "http server exited with error");
    }

    supervisor.stop_all();
    Ok(())
}
