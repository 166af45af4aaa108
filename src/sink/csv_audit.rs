//! CSV audit log — one row per class detection and one row per event
//! start/stop.
//!
//! Grounded on `itsmontoya-scribble`'s `JsonArrayEncoder`
//! (`src/json_array_encoder.rs`): the writer is opened lazily on first use
//! and `close()` is idempotent, flushing on every row rather than buffering
//! so a crash mid-run still leaves a readable file. The column layout
//! mirrors `yamcam5/yamcam_functions.py`'s `sound_log_writer` header.
//!
//! One writer per process startup, file path includes the startup
//! timestamp so restarts never clobber a prior run's audit trail.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

const HEADER: [&str; 8] = [
    "datetime",
    "camera",
    "group",
    "group_score",
    "class",
    "class_score",
    "event_start",
    "event_end",
];

/// One audit row. `class`/`class_score` are empty for event start/stop rows;
/// `event_start`/`event_end` are empty for per-class detection rows.
#[derive(Debug, Clone, Default)]
pub struct AuditRow {
    pub datetime: String,
    pub camera: String,
    pub group: String,
    pub group_score: String,
    pub class: String,
    pub class_score: String,
    pub event_start: String,
    pub event_end: String,
}

impl AuditRow {
    fn as_record(&self) -> [&str; 8] {
        [
            &self.datetime,
            &self.camera,
            &self.group,
            &self.group_score,
            &self.class,
            &self.class_score,
            &self.event_start,
            &self.event_end,
        ]
    }
}

struct Inner {
    writer: Option<csv::Writer<File>>,
    /// Set once a write or flush fails; further writes are skipped rather
    /// than retried, since a write error (full disk, permissions) is rarely
    /// transient and retrying every window just re-fails the same way.
    disabled: bool,
}

/// Mutex-guarded so every source's worker thread can write rows without
/// external synchronization; one instance is shared (via `Arc`) across the
/// whole process.
pub struct CsvAuditLog {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl CsvAuditLog {
    /// Build the audit log's file path for a given log directory and
    /// process-startup timestamp (formatted by the caller as `%Y%m%d-%H%M`).
    pub fn path_for(log_dir: &Path, startup_stamp: &str) -> PathBuf {
        log_dir.join(format!("{startup_stamp}.csv"))
    }

    /// Opens nothing yet; the file is created on the first [`Self::write`] call.
    pub fn new(path: PathBuf) -> Self {
        Self { path, inner: Mutex::new(Inner { writer: None, disabled: false }) }
    }

    fn ensure_open(&self, inner: &mut Inner) -> Result<()> {
        if inner.writer.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::WriterBuilder::new().from_path(&self.path)?;
        writer.write_record(HEADER)?;
        writer.flush()?;
        inner.writer = Some(writer);
        Ok(())
    }

    /// Append one row and flush immediately. Once a write or flush fails,
    /// every subsequent call is a no-op `Err` without touching the file
    /// again, for the process's remaining lifetime.
    pub fn write(&self, row: &AuditRow) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.disabled {
            return Err(Error::CsvWriteError("audit log disabled after a prior write failure".into()));
        }

        if let Err(e) = self.ensure_open(&mut inner) {
            inner.disabled = true;
            return Err(e);
        }
        let writer = inner.writer.as_mut().expect("just ensured open");
        let result = writer
            .write_record(row.as_record())
            .map_err(|e| Error::CsvWriteError(e.to_string()))
            .and_then(|()| writer.flush().map_err(|e| Error::CsvWriteError(e.to_string())));

        if let Err(e) = result {
            inner.disabled = true;
            return Err(e);
        }
        Ok(())
    }

    /// Idempotent; safe to call multiple times (e.g. once on shutdown, once
    /// implicitly when the process exits and `File` is dropped).
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.writer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_then_rows() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = CsvAuditLog::path_for(dir.path(), "20260101-0000");
        let log = CsvAuditLog::new(path.clone());

        log.write(&AuditRow {
            datetime: "2026-01-01T00:00:00Z".into(),
            camera: "front_door".into(),
            group: "dog".into(),
            group_score: "0.9".into(),
            class: "dog.bark".into(),
            class_score: "0.9".into(),
            ..Default::default()
        })?;
        log.close();

        let contents = std::fs::read_to_string(&path)?;
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), HEADER.join(","));
        assert!(lines.next().unwrap().contains("front_door"));
        Ok(())
    }

    #[test]
    fn close_is_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = CsvAuditLog::path_for(dir.path(), "20260101-0000");
        let log = CsvAuditLog::new(path);
        log.close();
        log.close();
        Ok(())
    }

    #[test]
    fn write_failure_disables_further_writes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        // A directory can't be opened as a csv writer target; ensure_open fails.
        let log = CsvAuditLog::new(dir.path().to_path_buf());

        assert!(log.write(&AuditRow { camera: "x".into(), ..Default::default() }).is_err());
        assert!(log.write(&AuditRow { camera: "y".into(), ..Default::default() }).is_err());
        assert!(log.inner.lock().unwrap().disabled);
        Ok(())
    }

    #[test]
    fn file_is_created_lazily() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = CsvAuditLog::path_for(dir.path(), "20260101-0000");
        let log = CsvAuditLog::new(path.clone());
        assert!(!path.exists());
        log.write(&AuditRow { camera: "x".into(), ..Default::default() })?;
        assert!(path.exists());
        Ok(())
    }
}
