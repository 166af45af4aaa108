//! Sink — fans a detection or event out to the message bus and the CSV
//! audit log together.
//!
//! Grounded on `yamcam5/yamcam_functions.py::report_event`, which does both
//! in one call: publish a JSON payload to `{topic_prefix}/{event_type}` and
//! append a CSV row. [`Sink::record_event`]/[`Sink::record_detection`]
//! preserve that pairing, but keep the two halves independently fallible —
//! a sink-unavailable publish is logged and swallowed while a CSV write
//! failure is not, since the audit log is the system of record.

pub mod csv_audit;
pub mod publisher;

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::config::MqttConfig;
use crate::error::Result;
use crate::events::{EventKind, SoundEvent};
use crate::scoring::ClassDetection;
use csv_audit::{AuditRow, CsvAuditLog};
use publisher::PublishSink;

#[derive(Debug, Serialize)]
struct EventMessage<'a> {
    camera_name: &'a str,
    sound_class: &'a str,
    event_type: &'a str,
    timestamp: &'a str,
}

pub struct Sink {
    publisher: Arc<dyn PublishSink>,
    audit_log: Arc<CsvAuditLog>,
    topic_prefix: String,
}

impl Sink {
    pub fn new(publisher: Arc<dyn PublishSink>, audit_log: Arc<CsvAuditLog>, mqtt: &MqttConfig) -> Self {
        Self { publisher, audit_log, topic_prefix: mqtt.topic_prefix.clone() }
    }

    /// Publish + audit-log one group start/stop transition. `now` is local
    /// wall-clock time, matching `yamcam5`'s log/CSV timestamps.
    pub fn record_event(&self, event: &SoundEvent, now: chrono::DateTime<chrono::Local>) -> Result<()> {
        let timestamp = now.format("%Y-%m-%d %H:%M:%S").to_string();
        let event_type = event.kind.as_str();
        let topic = format!("{}/{}", self.topic_prefix, event_type);
        let payload = serde_json::to_vec(&EventMessage {
            camera_name: &event.source_name,
            sound_class: &event.group,
            event_type,
            timestamp: &timestamp,
        })?;

        if let Err(e) = self.publisher.publish(&topic, &payload) {
            warn!(error = %e, topic, "failed to publish event, continuing with audit log only");
        }

        let mut row = AuditRow {
            datetime: timestamp.clone(),
            camera: event.source_name.clone(),
            group: event.group.clone(),
            ..Default::default()
        };
        match event.kind {
            EventKind::Start => row.event_start = timestamp,
            EventKind::Stop => row.event_end = timestamp,
        }
        self.audit_log.write(&row)
    }

    /// Audit-log one surviving per-class detection (see
    /// `yamcam5::rank_sounds`). Not published to MQTT — only group-level
    /// start/stop events are.
    pub fn record_detection(
        &self,
        source_name: &str,
        group_score: f32,
        detection: &ClassDetection,
        now: chrono::DateTime<chrono::Local>,
    ) -> Result<()> {
        let row = AuditRow {
            datetime: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            camera: source_name.to_owned(),
            group: detection.group.clone(),
            group_score: group_score.to_string(),
            class: detection.class_name.clone(),
            class_score: detection.score.to_string(),
            ..Default::default()
        };
        self.audit_log.write(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MqttConfig;
    use publisher::RecordingSink;

    fn mqtt_cfg() -> MqttConfig {
        MqttConfig {
            host: "localhost".into(),
            port: 1883,
            topic_prefix: "camwatch".into(),
            client_id: "test".into(),
            user: None,
            password: None,
        }
    }

    #[test]
    fn record_event_publishes_and_writes_csv_row() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = CsvAuditLog::path_for(dir.path(), "20260101-0000");
        let audit_log = Arc::new(CsvAuditLog::new(path.clone()));
        let recording = Arc::new(RecordingSink::default());
        let sink = Sink::new(recording.clone(), audit_log, &mqtt_cfg());

        let event = SoundEvent { source_name: "front_door".into(), group: "dog".into(), kind: EventKind::Start };
        sink.record_event(&event, chrono::Local::now())?;

        let published = recording.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "camwatch/start");

        let contents = std::fs::read_to_string(&path)?;
        assert!(contents.contains("front_door"));
        assert!(contents.contains("dog"));
        Ok(())
    }

    #[test]
    fn record_detection_writes_class_row_without_publishing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = CsvAuditLog::path_for(dir.path(), "20260101-0000");
        let audit_log = Arc::new(CsvAuditLog::new(path.clone()));
        let recording = Arc::new(RecordingSink::default());
        let sink = Sink::new(recording.clone(), audit_log, &mqtt_cfg());

        let detection = ClassDetection { class_name: "dog.bark".into(), group: "dog".into(), score: 0.9 };
        sink.record_detection("front_door", 0.85, &detection, chrono::Local::now())?;

        assert!(recording.published.lock().unwrap().is_empty());
        let contents = std::fs::read_to_string(&path)?;
        assert!(contents.contains("dog.bark"));
        Ok(())
    }
}
