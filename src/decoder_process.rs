//! Decoder subprocess — spawns and supervises one `ffmpeg` child per source.
//!
//! Grounded on `yamcam5/camera_audio_stream.py`: the exact flag list below
//! is carried over unchanged as a fixed external interface, as is the
//! `"Press [q] to stop"` readiness marker and the set
//! of fatal stderr substrings. Process lifecycle (spawn, graceful
//! terminate/wait/kill) follows the same shape `itsmontoya-scribble`'s
//! `PipeReader` assumes of its underlying reader: a std `Child` whose stdout
//! is read on a dedicated thread.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Stderr substrings that mean the source will never become reachable
/// without operator intervention; retrying is pointless. Verbatim from
/// `_handle_stderr_line` in the original source.
const FATAL_DIAGNOSTICS: &[&str] = &[
    "401 Unauthorized",
    "403 Forbidden",
    "No route to host",
    "Connection refused",
    "timed out",
];

/// Printed by ffmpeg once it has begun streaming; marks the decoder ready.
pub const READY_MARKER: &str = "Press [q] to stop";

/// Classify one stderr line against the fatal-diagnostic list.
pub fn classify_diagnostic(line: &str) -> Option<&'static str> {
    FATAL_DIAGNOSTICS.iter().find(|&&needle| line.contains(needle)).copied()
}

pub fn is_ready_marker(line: &str) -> bool {
    line.contains(READY_MARKER)
}

fn build_command(rtsp_url: &str) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args([
        "-rtsp_transport",
        "tcp",
        "-timeout",
        "30000000",
        "-i",
        rtsp_url,
        "-f",
        "s16le",
        "-acodec",
        "pcm_s16le",
        "-ac",
        "1",
        "-ar",
        "16000",
        "-reorder_queue_size",
        "0",
        "-use_wallclock_as_timestamps",
        "1",
        "-probesize",
        "50M",
        "-analyzeduration",
        "10M",
        "-max_delay",
        "500000",
        "-flags",
        "low_delay",
        "-fflags",
        "nobuffer",
        "-",
    ]);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());
    cmd
}

/// A running decoder subprocess, plus the stdout/stderr handles its two I/O
/// threads read from.
pub struct DecoderProcess {
    child: Child,
}

impl DecoderProcess {
    /// Spawn `ffmpeg` against `rtsp_url`. Returns [`Error::DecoderUnreachable`]
    /// only if the binary itself can't be spawned (missing `ffmpeg` on
    /// `PATH`); a reachable-but-rejecting source is detected later via
    /// stderr diagnostics, not here.
    pub fn spawn(source_name: &str, rtsp_url: &str) -> Result<Self> {
        build_command(rtsp_url)
            .spawn()
            .map(|child| Self { child })
            .map_err(|e| Error::DecoderUnreachable {
                source_name: source_name.to_owned(),
                reason: e.to_string(),
            })
    }

    pub fn take_stdout(&mut self) -> Option<impl Read + Send + 'static> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<impl Read + Send + 'static> {
        self.child.stderr.take()
    }

    /// Graceful stop: a std `Child` has no SIGTERM method, so this sends one
    /// via `libc::kill` first and falls back to `Child::kill` (SIGKILL) if
    /// the process hasn't exited within the grace period — the same
    /// terminate-then-wait-then-kill sequence the original applies.
    pub fn stop(&mut self, source_name: &str) {
        #[cfg(unix)]
        {
            unsafe {
                libc::kill(self.child.id() as i32, libc::SIGTERM);
            }
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(source_name, error = %e, "error waiting on decoder process");
                    break;
                }
            }
        }

        debug!(source_name, "decoder did not exit within grace period, killing");
        if let Err(e) = self.child.kill() {
            warn!(source_name, error = %e, "failed to kill decoder process");
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_fatal_diagnostics() {
        assert_eq!(
            classify_diagnostic("rtsp://x: 401 Unauthorized"),
            Some("401 Unauthorized")
        );
        assert_eq!(classify_diagnostic("frame=  120 fps=25"), None);
    }

    #[test]
    fn detects_ready_marker() {
        assert!(is_ready_marker("   q    Press [q] to stop, [?] for help"));
        assert!(!is_ready_marker("frame=  120 fps=25"));
    }
}
