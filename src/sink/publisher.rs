//! Event publisher — the message-bus side of the sink.
//!
//! `PublishSink` plays the same role `itsmontoya-scribble`'s `SegmentEncoder`
//! trait (`src/segment_encoder.rs`) plays for transcript output: a thin
//! boundary so the rest of the crate never depends on a concrete transport.
//! [`MqttPublisher`] is the production implementation over `rumqttc`;
//! `connect()` mirrors the client/eventloop split `rumqttc` requires, with
//! the eventloop driven on its own thread so publish calls stay non-blocking
//! for the worker threads that call them.

use std::thread;

use rumqttc::{Client, MqttOptions, QoS};
use tracing::{error, warn};

use crate::config::MqttConfig;
use crate::error::{Error, Result};

/// Where an event or detection gets published.
pub trait PublishSink: Send + Sync {
    /// Publish `payload` (already-serialized JSON) to `topic`.
    ///
    /// A publish failure is [`Error::SinkUnavailable`] and non-fatal:
    /// callers still commit the row to the CSV audit log.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

pub struct MqttPublisher {
    client: Client,
}

impl MqttPublisher {
    /// Connect to the broker and spawn the background thread that drives
    /// `rumqttc`'s event loop. Connection/auth failures surface on first
    /// publish rather than here — the sink is treated as best-effort rather
    /// than a startup precondition.
    pub fn connect(cfg: &MqttConfig) -> Self {
        let mut opts = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        opts.set_keep_alive(std::time::Duration::from_secs(30));
        if let (Some(user), Some(password)) = (&cfg.user, &cfg.password) {
            opts.set_credentials(user.clone(), password.clone());
        }

        let (client, mut connection) = Client::new(opts, 64);
        thread::spawn(move || {
            for notification in connection.iter() {
                if let Err(e) = notification {
                    warn!(error = %e, "mqtt event loop error");
                    thread::sleep(std::time::Duration::from_secs(1));
                }
            }
        });

        Self { client }
    }
}

impl PublishSink for MqttPublisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| {
                error!(topic, error = %e, "mqtt publish failed");
                Error::SinkUnavailable(e.to_string())
            })
    }
}

/// In-memory recorder used by tests elsewhere in the crate, modeled on
/// `itsmontoya-scribble`'s `NoopEncoder`/`DummyBackend` test doubles.
#[cfg(test)]
pub struct RecordingSink {
    pub published: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
}

#[cfg(test)]
impl Default for RecordingSink {
    fn default() -> Self {
        Self { published: std::sync::Mutex::new(Vec::new()) }
    }
}

#[cfg(test)]
impl PublishSink for RecordingSink {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_owned(), payload.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_records_publishes() {
        let sink = RecordingSink::default();
        sink.publish("camwatch/start", b"{}").unwrap();
        let published = sink.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "camwatch/start");
    }
}
