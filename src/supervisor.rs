//! Supervisor — owns every source's [`StreamWorker`] and the 60s liveness
//! loop that restarts ones that died.
//!
//! Grounded on `yamcam5/yamcam_supervisor.py::CameraStreamSupervisor`:
//! `start_all_streams` spawns one worker per configured source,
//! `monitor_streams` polls every 60s for dead workers and restarts them, and
//! `stop_all_streams` is idempotent and iterates over a snapshot of the
//! worker map so a worker that removes itself mid-shutdown can't deadlock
//! the stop sweep.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::events::EventEngineRegistry;
use crate::inference::InferenceEngine;
use crate::shutdown::Shutdown;
use crate::sink::Sink;
use crate::stream_worker::StreamWorker;
use crate::taxonomy::Taxonomy;

const LIVENESS_INTERVAL: Duration = Duration::from_secs(60);

/// Constructs one fresh inference engine instance per worker start/restart:
/// each stream worker holds its own inference engine instance.
pub trait EngineFactory<E: InferenceEngine + Send + 'static>: Send + Sync {
    fn build(&self) -> crate::error::Result<E>;
}

impl<E, F> EngineFactory<E> for F
where
    E: InferenceEngine + Send + 'static,
    F: Fn() -> crate::error::Result<E> + Send + Sync,
{
    fn build(&self) -> crate::error::Result<E> {
        self()
    }
}

pub struct Supervisor<E, F> {
    config: Arc<Config>,
    taxonomy: Arc<Taxonomy>,
    engine_factory: F,
    sink: Arc<Sink>,
    event_engines: EventEngineRegistry,
    shutdown: Shutdown,
    workers: Mutex<HashMap<String, StreamWorker>>,
    _engine: std::marker::PhantomData<E>,
}

impl<E, F> Supervisor<E, F>
where
    E: InferenceEngine + Send + 'static,
    F: EngineFactory<E>,
{
    pub fn new(config: Arc<Config>, taxonomy: Arc<Taxonomy>, engine_factory: F, sink: Arc<Sink>, shutdown: Shutdown) -> Self {
        Self {
            config,
            taxonomy,
            engine_factory,
            sink,
            event_engines: EventEngineRegistry::new(),
            shutdown,
            workers: Mutex::new(HashMap::new()),
            _engine: std::marker::PhantomData,
        }
    }

    /// Shared handle to the per-source event-count registry, for wiring the
    /// summary reporter up in `main`.
    pub fn event_engines(&self) -> EventEngineRegistry {
        self.event_engines.clone()
    }

    fn event_engine_for(&self, source_name: &str) -> Arc<Mutex<crate::events::EventEngine>> {
        let events_cfg = &self.config.events;
        self.event_engines
            .get_or_create(source_name, events_cfg.window_detect, events_cfg.persistence, events_cfg.decay)
    }

    /// Spawn a worker for every configured source.
    pub fn start_all(&self) -> crate::error::Result<()> {
        let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        for source in &self.config.sources {
            info!(source_name = %source.name, "starting stream worker");
            let worker = StreamWorker::start(
                source.clone(),
                &self.config,
                self.taxonomy.clone(),
                self.engine_factory.build()?,
                self.sink.clone(),
                self.event_engine_for(&source.name),
                self.shutdown.clone(),
            )?;
            workers.insert(source.name.clone(), worker);
        }
        #[cfg(feature = "server")]
        crate::metrics::set_active_workers(workers.len() as i64);
        Ok(())
    }

    /// Poll every [`LIVENESS_INTERVAL`] for workers that have stopped on
    /// their own and restart them, until shutdown is signaled. Intended to
    /// be run on its own thread.
    pub fn run_liveness_loop(&self) {
        while !self.shutdown.sleep_or_shutdown(LIVENESS_INTERVAL) {
            self.restart_dead_workers();
        }
    }

    fn restart_dead_workers(&self) {
        let dead_sources: Vec<String> = {
            let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
            workers
                .iter()
                .filter(|(_, w)| w.is_stopped())
                .map(|(name, _)| name.clone())
                .collect()
        };

        for name in dead_sources {
            let Some(source) = self.config.sources.iter().find(|s| s.name == name) else {
                continue;
            };
            warn!(source_name = %name, "worker died, restarting");
            let event_engine = self.event_engine_for(&name);
            let result = self.engine_factory.build().and_then(|engine| {
                StreamWorker::start(
                    source.clone(),
                    &self.config,
                    self.taxonomy.clone(),
                    engine,
                    self.sink.clone(),
                    event_engine,
                    self.shutdown.clone(),
                )
            });
            match result {
                Ok(worker) => {
                    let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
                    workers.insert(name, worker);
                    #[cfg(feature = "server")]
                    crate::metrics::set_active_workers(workers.len() as i64);
                }
                Err(e) => error_restarting(&name, &e),
            }
        }
    }

    /// Idempotent: stops every worker, iterating over a snapshot of names
    /// so a worker's own `Drop` running mid-sweep can't re-enter the map
    /// while it's locked.
    pub fn stop_all(&self) {
        self.shutdown.set();
        let names: Vec<String> = {
            let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
            workers.keys().cloned().collect()
        };

        for name in names {
            let worker = self.workers.lock().unwrap_or_else(|p| p.into_inner()).remove(&name);
            if let Some(mut worker) = worker {
                worker.stop();
            }
        }

        #[cfg(feature = "server")]
        crate::metrics::set_active_workers(self.worker_count() as i64);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

fn error_restarting(source_name: &str, error: &crate::error::Error) {
    tracing::error!(source_name, %error, "failed to restart worker");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EventsConfig, MqttConfig, SoundsConfig, SourceConfig};
    use crate::inference::FixedEngine;
    use crate::sink::csv_audit::CsvAuditLog;
    use crate::sink::publisher::RecordingSink;
    use crate::taxonomy::{SCORE_VECTOR_LEN, Taxonomy};

    fn test_config(sources: Vec<SourceConfig>) -> Config {
        Config {
            log_level: crate::config::LogLevel::Info,
            noise_threshold: 0.1,
            default_min_score: 0.5,
            top_k: 10,
            summary_interval: 60,
            ffmpeg_debug: false,
            logfile: false,
            sound_log: false,
            log_dir: "/tmp".into(),
            events: EventsConfig { window_detect: 5, persistence: 3, decay: 15 },
            sounds: SoundsConfig {
                tracked_groups: vec!["dog".into()],
                group_min_score: Default::default(),
                default_min_score: 0.5,
            },
            sources,
            mqtt: MqttConfig {
                host: "localhost".into(),
                port: 1883,
                topic_prefix: "camwatch".into(),
                client_id: "test".into(),
                user: None,
                password: None,
            },
        }
    }

    #[test]
    fn stop_all_with_no_workers_is_a_noop() {
        let config = Arc::new(test_config(vec![]));
        let taxonomy = Arc::new(Taxonomy::from_names(vec!["silence"; SCORE_VECTOR_LEN]));
        let engine_factory = || Ok(FixedEngine { scores: vec![0.0; SCORE_VECTOR_LEN] });
        let dir = tempfile::tempdir().unwrap();
        let audit_log = Arc::new(CsvAuditLog::new(CsvAuditLog::path_for(dir.path(), "x")));
        let recording = Arc::new(RecordingSink::default());
        let sink = Arc::new(Sink::new(recording, audit_log, &config.mqtt));

        let supervisor = Supervisor::new(config, taxonomy, engine_factory, sink, Shutdown::new());
        supervisor.stop_all();
        supervisor.stop_all();
        assert_eq!(supervisor.worker_count(), 0);
    }

    #[test]
    fn event_engine_for_source_is_stable_across_calls() {
        let source = SourceConfig { name: "front_door".into(), rtsp_url: "rtsp://x".into() };
        let config = Arc::new(test_config(vec![source]));
        let taxonomy = Arc::new(Taxonomy::from_names(vec!["silence"; SCORE_VECTOR_LEN]));
        let engine_factory = || Ok(FixedEngine { scores: vec![0.0; SCORE_VECTOR_LEN] });
        let dir = tempfile::tempdir().unwrap();
        let audit_log = Arc::new(CsvAuditLog::new(CsvAuditLog::path_for(dir.path(), "x")));
        let recording = Arc::new(RecordingSink::default());
        let sink = Arc::new(Sink::new(recording, audit_log, &config.mqtt));

        let supervisor = Supervisor::new(config, taxonomy, engine_factory, sink, Shutdown::new());
        let first = supervisor.event_engine_for("front_door");
        let second = supervisor.event_engine_for("front_door");
        assert!(Arc::ptr_eq(&first, &second), "a restart must reuse the same event engine, not a fresh one");
    }
}
