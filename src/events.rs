//! Event state machine — turns a per-window stream of admitted groups into
//! start/stop events per `(source, group)`.
//!
//! Grounded on `yamcam5/yamcam_functions.py::update_sound_window`: a sliding
//! detection window of bounded length, a persistence count to start an
//! event, and a decay counter to end one after enough consecutive silent
//! windows. The Python keeps this as module-global dicts keyed by camera
//! name; here it is owned state behind [`EventEngine`], one instance per
//! source, following the same windowed/decaying shape `VadStream`
//! (`itsmontoya-scribble/src/vad/stream.rs`) uses for its own sliding buffer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::scoring::AdmittedGroup;

/// A detected transition for one `(source, group)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundEvent {
    pub source_name: String,
    pub group: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Stop,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
        }
    }
}

struct GroupState {
    window: VecDeque<bool>,
    active: bool,
    decay_remaining: usize,
    count: u64,
}

impl GroupState {
    fn new() -> Self {
        Self { window: VecDeque::new(), active: false, decay_remaining: 0, count: 0 }
    }
}

/// Per-source event state machine.
pub struct EventEngine {
    source_name: String,
    window_detect: usize,
    persistence: usize,
    decay: usize,
    groups: HashMap<String, GroupState>,
}

impl EventEngine {
    pub fn new(source_name: impl Into<String>, window_detect: usize, persistence: usize, decay: usize) -> Self {
        Self {
            source_name: source_name.into(),
            window_detect,
            persistence,
            decay,
            groups: HashMap::new(),
        }
    }

    /// Feed one window's admitted groups. `admitted` should contain every
    /// group that cleared scoring this window; any tracked group not
    /// present is treated as "not detected" for its own sliding window.
    pub fn observe(&mut self, admitted: &[AdmittedGroup]) -> Vec<SoundEvent> {
        let detected_now: std::collections::HashSet<&str> =
            admitted.iter().map(|g| g.group.as_str()).collect();

        let mut events = Vec::new();
        let tracked_groups: Vec<String> = self
            .groups
            .keys()
            .cloned()
            .chain(detected_now.iter().map(|g| g.to_string()))
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();

        for group in tracked_groups {
            let detected = detected_now.contains(group.as_str());
            let state = self.groups.entry(group.clone()).or_insert_with(GroupState::new);

            state.window.push_back(detected);
            while state.window.len() > self.window_detect {
                state.window.pop_front();
            }

            let true_count = state.window.iter().filter(|&&v| v).count();

            if !state.active {
                if true_count >= self.persistence {
                    state.active = true;
                    state.decay_remaining = self.decay;
                    state.count += 1;
                    events.push(SoundEvent {
                        source_name: self.source_name.clone(),
                        group: group.clone(),
                        kind: EventKind::Start,
                    });
                }
            } else if detected {
                state.decay_remaining = self.decay;
            } else {
                state.decay_remaining = state.decay_remaining.saturating_sub(1);
                if state.decay_remaining == 0 {
                    state.active = false;
                    events.push(SoundEvent {
                        source_name: self.source_name.clone(),
                        group: group.clone(),
                        kind: EventKind::Stop,
                    });
                }
            }
        }

        events
    }

    /// Per-group event counts since the last [`EventEngine::take_counts`]
    /// call — feeds the summary reporter.
    pub fn take_counts(&mut self) -> HashMap<String, u64> {
        let mut out = HashMap::new();
        for (group, state) in self.groups.iter_mut() {
            if state.count > 0 {
                out.insert(group.clone(), state.count);
                state.count = 0;
            }
        }
        out
    }
}

/// Keeps one [`EventEngine`] per source alive for the whole process, so a
/// worker that the supervisor restarts picks its sliding window, active
/// state, and decay counters back up instead of starting cold. Grounded on
/// the same map-keyed-by-camera-name shape `yamcam5` uses for its
/// module-global dicts, made explicit here since each source's engine now
/// outlives any one `StreamWorker`.
#[derive(Clone, Default)]
pub struct EventEngineRegistry(Arc<Mutex<HashMap<String, Arc<Mutex<EventEngine>>>>>);

impl EventEngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing engine for `source_name`, creating one with the
    /// given parameters if this is the first time this source has started.
    pub fn get_or_create(
        &self,
        source_name: &str,
        window_detect: usize,
        persistence: usize,
        decay: usize,
    ) -> Arc<Mutex<EventEngine>> {
        let mut engines = self.0.lock().unwrap_or_else(|p| p.into_inner());
        engines
            .entry(source_name.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(EventEngine::new(source_name, window_detect, persistence, decay))))
            .clone()
    }

    /// Drain every known source's per-group counts since the last call, for
    /// the summary reporter. Sources with no engine yet
    /// (never started) are not represented here; callers report those
    /// separately against the configured source list.
    pub fn drain_counts(&self) -> Vec<(String, HashMap<String, u64>)> {
        let engines = self.0.lock().unwrap_or_else(|p| p.into_inner());
        engines
            .iter()
            .map(|(name, engine)| {
                let counts = engine.lock().unwrap_or_else(|p| p.into_inner()).take_counts();
                (name.clone(), counts)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admitted(groups: &[&str]) -> Vec<AdmittedGroup> {
        groups
            .iter()
            .map(|g| AdmittedGroup { group: g.to_string(), composite: 0.9 })
            .collect()
    }

    #[test]
    fn starts_after_persistence_trues_in_window() {
        let mut engine = EventEngine::new("front_door", 5, 3, 15);
        assert!(engine.observe(&admitted(&["dog"])).is_empty());
        assert!(engine.observe(&admitted(&["dog"])).is_empty());
        let events = engine.observe(&admitted(&["dog"]));
        assert_eq!(events, vec![SoundEvent {
            source_name: "front_door".into(),
            group: "dog".into(),
            kind: EventKind::Start,
        }]);
    }

    #[test]
    fn does_not_restart_while_active() {
        let mut engine = EventEngine::new("front_door", 5, 2, 15);
        engine.observe(&admitted(&["dog"]));
        let events = engine.observe(&admitted(&["dog"]));
        assert!(events.is_empty(), "should have started on prior call, not restart");
    }

    #[test]
    fn decay_counter_resets_on_detection_then_stops_after_enough_silence() {
        let mut engine = EventEngine::new("front_door", 3, 2, 2);
        engine.observe(&admitted(&["dog"]));
        engine.observe(&admitted(&["dog"]));

        // one silent window: decay ticks down from 2 to 1, not yet stopped
        assert!(engine.observe(&admitted(&[])).is_empty());
        // detection resets decay back to full
        assert!(engine.observe(&admitted(&["dog"])).is_empty());
        // two silent windows in a row now required to stop
        assert!(engine.observe(&admitted(&[])).is_empty());
        let events = engine.observe(&admitted(&[]));
        assert_eq!(events, vec![SoundEvent {
            source_name: "front_door".into(),
            group: "dog".into(),
            kind: EventKind::Stop,
        }]);
    }

    #[test]
    fn counts_accumulate_and_reset_on_take() {
        let mut engine = EventEngine::new("front_door", 2, 1, 1);
        engine.observe(&admitted(&["dog"]));
        engine.observe(&admitted(&[]));
        engine.observe(&admitted(&["dog"]));

        let counts = engine.take_counts();
        assert_eq!(counts.get("dog"), Some(&2));
        assert!(engine.take_counts().is_empty());
    }

    #[test]
    fn registry_reuses_the_same_engine_across_restarts() {
        let registry = EventEngineRegistry::new();
        let engine = registry.get_or_create("front_door", 5, 3, 15);
        engine.lock().unwrap().observe(&admitted(&["dog"]));
        engine.lock().unwrap().observe(&admitted(&["dog"]));

        // simulate a restart: fetch the handle again with the same params
        let same_engine = registry.get_or_create("front_door", 5, 3, 15);
        let events = same_engine.lock().unwrap().observe(&admitted(&["dog"]));
        assert_eq!(events, vec![SoundEvent {
            source_name: "front_door".into(),
            group: "dog".into(),
            kind: EventKind::Start,
        }]);
    }
}
