//! Stream worker — owns one source's decoder subprocess end to end.
//!
//! State machine: `Idle -> Starting -> Running -> Stopping -> Stopped`.
//! Grounded on `yamcam5/camera_audio_stream.py`'s `CameraAudioStream`: a read
//! thread draining stdout into frames, a second thread draining stderr for
//! diagnostics, and a watchdog that stops the worker if `"Press [q] to stop"`
//! never arrives within 30s of spawn. A fourth, finalizer thread joins all
//! three and only then promotes the worker to `Stopped` — this is what lets
//! the worker reach `Stopped` on its own (decoder exit, fatal diagnostic,
//! watchdog timeout) and not just in response to an explicit [`StreamWorker::stop`]
//! call, so the supervisor's liveness sweep can actually detect a dead
//! worker and restart it. Unlike the original (whose `stop()` trips a
//! *global* shutdown flag), each worker's stop is scoped to itself. Each
//! worker owns its own [`InferenceEngine`] instance: no contention across
//! sources, no `Sync` bound needed on the engine type. The event state
//! machine itself lives outside the worker (see [`crate::events::EventEngineRegistry`])
//! so its window/active/decay state survives a restart.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::{Config, SourceConfig};
use crate::decoder_process::{self, DecoderProcess};
use crate::events::EventEngine;
use crate::frame_assembler::FrameAssembler;
use crate::inference::InferenceEngine;
use crate::scoring;
use crate::shutdown::Shutdown;
use crate::sink::Sink;
use crate::taxonomy::Taxonomy;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const READ_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

struct Shared {
    state: Mutex<WorkerState>,
    ready: AtomicBool,
}

/// Owns a source's decoder process and its I/O threads (via the finalizer
/// thread, which owns the join handles for the rest).
pub struct StreamWorker {
    source_name: String,
    shared: Arc<Shared>,
    shutdown: Shutdown,
    process: Arc<Mutex<Option<DecoderProcess>>>,
    threads: Vec<std::thread::JoinHandle<()>>,
}

impl StreamWorker {
    pub fn state(&self) -> WorkerState {
        *self.shared.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Spawn the decoder process and all I/O threads; blocks only long
    /// enough to fork the subprocess, not for it to become ready.
    pub fn start<E>(
        source: SourceConfig,
        config: &Config,
        taxonomy: Arc<Taxonomy>,
        engine: E,
        sink: Arc<Sink>,
        event_engine: Arc<Mutex<EventEngine>>,
        shutdown: Shutdown,
    ) -> crate::error::Result<Self>
    where
        E: InferenceEngine + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(WorkerState::Starting),
            ready: AtomicBool::new(false),
        });

        let mut decoder = DecoderProcess::spawn(&source.name, &source.rtsp_url)?;
        let stdout = decoder.take_stdout().expect("stdout piped at spawn");
        let stderr = decoder.take_stderr().expect("stderr piped at spawn");
        let process = Arc::new(Mutex::new(Some(decoder)));

        let stderr_handle = spawn_stderr_thread(
            source.name.clone(),
            stderr,
            shared.clone(),
            process.clone(),
            shutdown.clone(),
        );

        let audio_handle = spawn_audio_thread(
            source.clone(),
            config,
            taxonomy,
            engine,
            sink,
            event_engine,
            stdout,
            shared.clone(),
            shutdown.clone(),
        );

        let watchdog_handle = spawn_watchdog_thread(
            source.name.clone(),
            shared.clone(),
            process.clone(),
            shutdown.clone(),
        );

        let finalizer_handle = spawn_finalizer_thread(
            source.name.clone(),
            shared.clone(),
            process.clone(),
            audio_handle,
            stderr_handle,
            watchdog_handle,
        );

        Ok(Self { source_name: source.name, shared, shutdown, process, threads: vec![finalizer_handle] })
    }

    /// Graceful stop: idempotent, safe to call from the supervisor's
    /// liveness loop or from final shutdown. Actually reaching `Stopped` is
    /// the finalizer thread's job; this just requests the process die and
    /// waits for that to happen.
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|p| p.into_inner());
            if *state == WorkerState::Stopped || *state == WorkerState::Stopping {
                return;
            }
            *state = WorkerState::Stopping;
        }

        if let Some(process) = self.process.lock().unwrap_or_else(|p| p.into_inner()).as_mut() {
            process.stop(&self.source_name);
        }

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == WorkerState::Stopped
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        if !self.is_stopped() {
            self.stop();
        }
    }
}

fn spawn_stderr_thread(
    source_name: String,
    mut stderr: impl Read + Send + 'static,
    shared: Arc<Shared>,
    process: Arc<Mutex<Option<DecoderProcess>>>,
    shutdown: Shutdown,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        let mut pending = String::new();
        loop {
            if shutdown.is_set() {
                return;
            }
            match stderr.read(&mut buf) {
                Ok(0) => return,
                Ok(n) => {
                    pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                    while let Some(idx) = pending.find(['\n', '\r']) {
                        let line = pending[..idx].to_owned();
                        pending.drain(..=idx);
                        handle_diagnostic_line(&source_name, &line, &shared, &process);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(READ_BACKOFF);
                }
                Err(_) => return,
            }
        }
    })
}

fn handle_diagnostic_line(
    source_name: &str,
    line: &str,
    shared: &Arc<Shared>,
    process: &Arc<Mutex<Option<DecoderProcess>>>,
) {
    if decoder_process::is_ready_marker(line) {
        shared.ready.store(true, Ordering::SeqCst);
        *shared.state.lock().unwrap_or_else(|p| p.into_inner()) = WorkerState::Running;
        info!(source_name, "decoder ready");
        return;
    }

    if let Some(reason) = decoder_process::classify_diagnostic(line) {
        error!(source_name, reason, "fatal decoder diagnostic, stopping source");
        if let Some(p) = process.lock().unwrap_or_else(|p| p.into_inner()).as_mut() {
            p.stop(source_name);
        }
    }
}

fn spawn_audio_thread<E>(
    source: SourceConfig,
    config: &Config,
    taxonomy: Arc<Taxonomy>,
    engine: E,
    sink: Arc<Sink>,
    event_engine: Arc<Mutex<EventEngine>>,
    mut stdout: impl Read + Send + 'static,
    shared: Arc<Shared>,
    shutdown: Shutdown,
) -> std::thread::JoinHandle<()>
where
    E: InferenceEngine + Send + 'static,
{
    let noise_threshold = config.noise_threshold;
    let top_k = config.top_k;
    let sounds = config.sounds.clone();

    std::thread::spawn(move || {
        let mut assembler = FrameAssembler::new();
        let mut buf = [0u8; 8192];

        loop {
            if shutdown.is_set() {
                break;
            }
            match stdout.read(&mut buf) {
                Ok(0) => {
                    if let Err(e) = assembler.finish(&source.name) {
                        warn!(source_name = %source.name, error = %e, "stream ended with truncated frame");
                    }
                    break;
                }
                Ok(n) => {
                    for waveform in assembler.push(&buf[..n]) {
                        let scores = match engine.classify(&waveform) {
                            Ok(s) => s,
                            Err(e) => {
                                warn!(source_name = %source.name, error = %e, "inference failed for window");
                                continue;
                            }
                        };

                        let detections = scoring::filter_noise(&taxonomy, &scores, noise_threshold);
                        let now = chrono::Local::now();
                        for d in &detections {
                            if let Err(e) = sink.record_detection(&source.name, d.score, d, now) {
                                error!(source_name = %source.name, error = %e, "failed to write detection audit row");
                            }
                        }

                        let groups = scoring::composite_scores_by_group(&detections);
                        let ranked = scoring::top_k(groups, top_k);
                        let admitted = scoring::admit(&ranked, &sounds);

                        let emitted = event_engine.lock().unwrap_or_else(|p| p.into_inner()).observe(&admitted);
                        for event in emitted {
                            #[cfg(feature = "server")]
                            crate::metrics::record_event(&event.source_name, &event.group, event.kind.as_str());

                            if let Err(e) = sink.record_event(&event, chrono::Local::now()) {
                                error!(source_name = %source.name, error = %e, "failed to record event");
                            }
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(READ_BACKOFF);
                }
                Err(e) => {
                    warn!(source_name = %source.name, error = %e, "decoder stdout read error");
                    break;
                }
            }
        }

        *shared.state.lock().unwrap_or_else(|p| p.into_inner()) = WorkerState::Stopping;
    })
}

fn spawn_watchdog_thread(
    source_name: String,
    shared: Arc<Shared>,
    process: Arc<Mutex<Option<DecoderProcess>>>,
    shutdown: Shutdown,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let deadline = Instant::now() + STARTUP_TIMEOUT;
        while Instant::now() < deadline {
            if shutdown.is_set() || shared.ready.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(Duration::from_millis(200));
        }

        if !shared.ready.load(Ordering::SeqCst) && !shutdown.is_set() {
            warn!(source_name, "decoder did not become ready within startup timeout, stopping");
            if let Some(p) = process.lock().unwrap_or_else(|p| p.into_inner()).as_mut() {
                p.stop(&source_name);
            }
        }
    })
}

/// Joins the other three threads in sequence and only then promotes the
/// worker to `Stopped`. This is the only path that reaches `Stopped` — it
/// runs whether the worker died on its own (decoder exit, fatal diagnostic,
/// watchdog timeout) or was stopped explicitly, so [`StreamWorker::is_stopped`]
/// reflects reality either way.
fn spawn_finalizer_thread(
    source_name: String,
    shared: Arc<Shared>,
    process: Arc<Mutex<Option<DecoderProcess>>>,
    audio_handle: std::thread::JoinHandle<()>,
    stderr_handle: std::thread::JoinHandle<()>,
    watchdog_handle: std::thread::JoinHandle<()>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let _ = audio_handle.join();
        let _ = stderr_handle.join();
        let _ = watchdog_handle.join();

        if let Some(p) = process.lock().unwrap_or_else(|p| p.into_inner()).as_mut() {
            p.stop(&source_name);
        }

        *shared.state.lock().unwrap_or_else(|p| p.into_inner()) = WorkerState::Stopped;
        info!(source_name, "stream worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_line_sets_ready_and_running() {
        let shared = Arc::new(Shared { state: Mutex::new(WorkerState::Starting), ready: AtomicBool::new(false) });
        let process = Arc::new(Mutex::new(None));
        handle_diagnostic_line("front_door", "   q    Press [q] to stop", &shared, &process);
        assert!(shared.ready.load(Ordering::SeqCst));
        assert_eq!(*shared.state.lock().unwrap(), WorkerState::Running);
    }

    #[test]
    fn fatal_diagnostic_does_not_flip_ready() {
        let shared = Arc::new(Shared { state: Mutex::new(WorkerState::Starting), ready: AtomicBool::new(false) });
        let process = Arc::new(Mutex::new(None));
        handle_diagnostic_line("front_door", "rtsp://x: 401 Unauthorized", &shared, &process);
        assert!(!shared.ready.load(Ordering::SeqCst));
    }
}
