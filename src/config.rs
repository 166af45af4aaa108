//! Validated configuration record.
//!
//! YAML *loading* is treated as an external collaborator; this module owns
//! the *validated record* the rest of the crate consumes: a `RawConfig` that
//! mirrors the YAML shape 1:1, and a `Config` built from it by
//! [`Config::from_raw`], which applies every clamp, default, and fatal check.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

/// `general.log_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            // tracing has no WARNING/CRITICAL variant; map onto the nearest level.
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

/// `aggregation_method`, retained only for backward-compatible config
/// parsing. Composite scoring always follows the fixed rule in
/// [`crate::scoring`]; `Mean`/`Sum` are deprecated and rejected at
/// validation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Max,
    Mean,
    Sum,
}

#[derive(Debug, Deserialize)]
struct RawGeneral {
    #[serde(default = "default_log_level")]
    log_level: LogLevel,
    #[serde(default = "default_noise_threshold")]
    noise_threshold: f32,
    #[serde(default = "default_min_score")]
    default_min_score: f32,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_summary_interval")]
    summary_interval: u64,
    #[serde(default)]
    ffmpeg_debug: bool,
    #[serde(default)]
    logfile: bool,
    #[serde(default)]
    sound_log: bool,
    aggregation_method: Option<AggregationMethod>,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}
fn default_noise_threshold() -> f32 {
    0.1
}
fn default_min_score() -> f32 {
    0.5
}
fn default_top_k() -> usize {
    10
}
fn default_summary_interval() -> u64 {
    60
}

#[derive(Debug, Deserialize)]
struct RawEvents {
    #[serde(default = "default_window_detect")]
    window_detect: usize,
    #[serde(default = "default_persistence")]
    persistence: usize,
    #[serde(default = "default_decay")]
    decay: usize,
}

fn default_window_detect() -> usize {
    5
}
fn default_persistence() -> usize {
    3
}
fn default_decay() -> usize {
    15
}

#[derive(Debug, Deserialize, Default)]
struct RawSoundFilter {
    min_score: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct RawSounds {
    #[serde(default)]
    track: Vec<String>,
    #[serde(default)]
    filters: HashMap<String, RawSoundFilter>,
}

#[derive(Debug, Deserialize)]
struct RawFfmpegInput {
    path: String,
}

#[derive(Debug, Deserialize)]
struct RawFfmpeg {
    inputs: Vec<RawFfmpegInput>,
}

#[derive(Debug, Deserialize)]
struct RawCamera {
    ffmpeg: RawFfmpeg,
}

#[derive(Debug, Deserialize)]
struct RawMqtt {
    host: String,
    #[serde(default = "default_mqtt_port")]
    port: u16,
    topic_prefix: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "camwatch".to_owned()
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    general: RawGeneral,
    #[serde(default)]
    events: Option<RawEvents>,
    #[serde(default)]
    sounds: RawSounds,
    cameras: HashMap<String, RawCamera>,
    mqtt: RawMqtt,
    #[serde(default)]
    log_dir: Option<String>,
}

/// One source (camera/microphone) configuration: a stable name and RTSP URL.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub rtsp_url: String,
}

#[derive(Debug, Clone)]
pub struct EventsConfig {
    pub window_detect: usize,
    pub persistence: usize,
    pub decay: usize,
}

#[derive(Debug, Clone)]
pub struct SoundsConfig {
    pub tracked_groups: Vec<String>,
    pub group_min_score: HashMap<String, f32>,
    pub default_min_score: f32,
}

impl SoundsConfig {
    pub fn is_tracked(&self, group: &str) -> bool {
        self.tracked_groups.iter().any(|g| g == group)
    }

    pub fn min_score_for(&self, group: &str) -> f32 {
        self.group_min_score
            .get(group)
            .copied()
            .unwrap_or(self.default_min_score)
    }
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic_prefix: String,
    pub client_id: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: LogLevel,
    pub noise_threshold: f32,
    pub default_min_score: f32,
    pub top_k: usize,
    pub summary_interval: u64,
    pub ffmpeg_debug: bool,
    pub logfile: bool,
    pub sound_log: bool,
    pub log_dir: String,
    pub events: EventsConfig,
    pub sounds: SoundsConfig,
    pub sources: Vec<SourceConfig>,
    pub mqtt: MqttConfig,
}

fn clamp_warn(name: &str, value: f32, min: f32, max: f32, default: f32) -> f32 {
    if value.is_finite() && value >= min && value <= max {
        return value;
    }
    warn!(field = name, value, min, max, default, "value out of range, clamping to default");
    default
}

impl Config {
    /// Parse, validate, and clamp a config from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        Self::from_raw(raw)
    }

    /// Load, validate, and clamp a config from a YAML file on disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        if raw.cameras.is_empty() {
            return Err(Error::ConfigInvalid(
                "'cameras' section is missing or empty".into(),
            ));
        }

        let mut sources = Vec::with_capacity(raw.cameras.len());
        for (name, camera) in raw.cameras {
            if name.trim().is_empty() {
                return Err(Error::ConfigInvalid("camera name must not be empty".into()));
            }
            let rtsp_url = camera
                .ffmpeg
                .inputs
                .first()
                .map(|i| i.path.clone())
                .ok_or_else(|| {
                    Error::ConfigInvalid(format!("camera '{name}': missing ffmpeg.inputs[0].path"))
                })?;
            if rtsp_url.trim().is_empty() {
                return Err(Error::ConfigInvalid(format!(
                    "camera '{name}': RTSP path must not be empty"
                )));
            }
            sources.push(SourceConfig { name, rtsp_url });
        }
        sources.sort_by(|a, b| a.name.cmp(&b.name));

        if raw.mqtt.host.trim().is_empty() {
            return Err(Error::ConfigInvalid("'mqtt.host' is missing".into()));
        }
        if raw.mqtt.topic_prefix.trim().is_empty() {
            return Err(Error::ConfigInvalid("'mqtt.topic_prefix' is missing".into()));
        }

        if let Some(method) = raw.general.aggregation_method
            && method != AggregationMethod::Max
        {
            warn!(
                ?method,
                "aggregation_method is deprecated; composite scoring always uses the fixed group-composite rule"
            );
        }

        let noise_threshold = clamp_warn(
            "general.noise_threshold",
            raw.general.noise_threshold,
            0.0,
            1.0,
            default_noise_threshold(),
        );
        let default_min_score = clamp_warn(
            "general.default_min_score",
            raw.general.default_min_score,
            0.0,
            1.0,
            default_min_score(),
        );
        let top_k = if (1..=20).contains(&raw.general.top_k) {
            raw.general.top_k
        } else {
            warn!(
                value = raw.general.top_k,
                "general.top_k out of [1,20], clamping to default"
            );
            default_top_k()
        };

        let raw_events = raw.events.unwrap_or(RawEvents {
            window_detect: default_window_detect(),
            persistence: default_persistence(),
            decay: default_decay(),
        });
        let window_detect = if raw_events.window_detect >= 1 {
            raw_events.window_detect
        } else {
            warn!("events.window_detect must be >= 1, clamping to default");
            default_window_detect()
        };
        let persistence = if raw_events.persistence >= 1 {
            raw_events.persistence
        } else {
            warn!("events.persistence must be >= 1, clamping to default");
            default_persistence()
        };
        let decay = if raw_events.decay >= 1 {
            raw_events.decay
        } else {
            warn!("events.decay must be >= 1, clamping to default");
            default_decay()
        };
        let persistence = persistence.min(window_detect).max(1);

        let mut group_min_score = HashMap::with_capacity(raw.sounds.filters.len());
        for (group, filter) in raw.sounds.filters {
            if let Some(min_score) = filter.min_score {
                let clamped = clamp_warn(
                    &format!("sounds.filters.{group}.min_score"),
                    min_score,
                    0.0,
                    1.0,
                    default_min_score,
                );
                group_min_score.insert(group, clamped);
            }
        }

        Ok(Config {
            log_level: raw.general.log_level,
            noise_threshold,
            default_min_score,
            top_k,
            summary_interval: raw.general.summary_interval.max(1),
            ffmpeg_debug: raw.general.ffmpeg_debug,
            logfile: raw.general.logfile,
            sound_log: raw.general.sound_log,
            log_dir: raw.log_dir.unwrap_or_else(|| "/media/camwatch".to_owned()),
            events: EventsConfig {
                window_detect,
                persistence,
                decay,
            },
            sounds: SoundsConfig {
                tracked_groups: raw.sounds.track,
                group_min_score,
                default_min_score,
            },
            sources,
            mqtt: MqttConfig {
                host: raw.mqtt.host,
                port: raw.mqtt.port,
                topic_prefix: raw.mqtt.topic_prefix,
                client_id: raw.mqtt.client_id,
                user: raw.mqtt.user,
                password: raw.mqtt.password,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
general:
  log_level: INFO
events:
  window_detect: 5
  persistence: 3
  decay: 15
sounds:
  track: [dog, vehicle]
  filters:
    dog:
      min_score: 0.6
cameras:
  front_door:
    ffmpeg:
      inputs:
        - path: "rtsp://example/front"
mqtt:
  host: "localhost"
  topic_prefix: "camwatch"
"#;

    #[test]
    fn parses_minimal_config() -> anyhow::Result<()> {
        let cfg = Config::from_yaml_str(MINIMAL_YAML)?;
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].name, "front_door");
        assert_eq!(cfg.events.window_detect, 5);
        assert_eq!(cfg.sounds.min_score_for("dog"), 0.6);
        assert_eq!(cfg.sounds.min_score_for("vehicle"), cfg.default_min_score);
        Ok(())
    }

    #[test]
    fn missing_cameras_is_fatal() {
        let yaml = r#"
general: {}
mqtt:
  host: "localhost"
  topic_prefix: "camwatch"
cameras: {}
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn missing_mqtt_is_fatal() {
        let yaml = r#"
general: {}
cameras:
  front_door:
    ffmpeg:
      inputs:
        - path: "rtsp://example/front"
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn out_of_range_noise_threshold_is_clamped_to_default() -> anyhow::Result<()> {
        let yaml = r#"
general:
  noise_threshold: 5.0
cameras:
  front_door:
    ffmpeg:
      inputs:
        - path: "rtsp://example/front"
mqtt:
  host: "localhost"
  topic_prefix: "camwatch"
"#;
        let cfg = Config::from_yaml_str(yaml)?;
        assert_eq!(cfg.noise_threshold, default_noise_threshold());
        Ok(())
    }

    #[test]
    fn persistence_is_capped_at_window_detect() -> anyhow::Result<()> {
        let yaml = r#"
general: {}
events:
  window_detect: 3
  persistence: 10
  decay: 15
cameras:
  front_door:
    ffmpeg:
      inputs:
        - path: "rtsp://example/front"
mqtt:
  host: "localhost"
  topic_prefix: "camwatch"
"#;
        let cfg = Config::from_yaml_str(yaml)?;
        assert_eq!(cfg.events.persistence, 3);
        Ok(())
    }
}
