//! Summary reporter — periodic per-source event-count log line.
//!
//! Grounded on `yamcam5/yamcam_functions.py::log_summary`: a thread that
//! sleeps for `summary_interval` minutes, then drains each source's
//! per-group event counts and logs one line per source, including sources
//! that saw nothing this interval.

use std::time::Duration;

use tracing::info;

use crate::events::EventEngineRegistry;
use crate::shutdown::Shutdown;

/// One source's line for this interval: `"{source}: {n} events: {groups}"`
/// or `"{source}: No sound events"` if nothing fired.
fn format_source_line(source_name: &str, counts: &std::collections::HashMap<String, u64>) -> String {
    if counts.is_empty() {
        return format!("{source_name}: No sound events");
    }
    let total: u64 = counts.values().sum();
    let mut groups: Vec<&str> = counts.keys().map(String::as_str).collect();
    groups.sort_unstable();
    format!("{source_name}: {total} events: {}", groups.join(", "))
}

/// Drain the registry and build one summary line per configured source,
/// regardless of whether that source had any events this interval.
fn build_summary_lines(event_engines: &EventEngineRegistry, source_names: &[String]) -> Vec<(String, String)> {
    let mut drained: std::collections::HashMap<String, std::collections::HashMap<String, u64>> =
        event_engines.drain_counts().into_iter().collect();

    source_names
        .iter()
        .map(|source_name| {
            let counts = drained.remove(source_name).unwrap_or_default();
            (source_name.clone(), format_source_line(source_name, &counts))
        })
        .collect()
}

/// Run the periodic reporting loop until shutdown. Intended to be run on its
/// own thread, one instance per process. `source_names` is every configured
/// source, so a source with zero events this interval still gets reported
/// rather than silently omitted.
pub fn run_loop(event_engines: EventEngineRegistry, source_names: Vec<String>, interval: Duration, shutdown: Shutdown) {
    while !shutdown.sleep_or_shutdown(interval) {
        for (source_name, line) in build_summary_lines(&event_engines, &source_names) {
            info!(source_name = %source_name, summary = %line, "event summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_source_line_reports_no_events() {
        assert_eq!(
            format_source_line("front_door", &std::collections::HashMap::new()),
            "front_door: No sound events"
        );
    }

    #[test]
    fn format_source_line_sums_and_lists_groups() {
        let mut counts = std::collections::HashMap::new();
        counts.insert("dog".to_owned(), 2u64);
        counts.insert("vehicle".to_owned(), 1u64);
        assert_eq!(format_source_line("front_door", &counts), "front_door: 3 events: dog, vehicle");
    }

    #[test]
    fn build_summary_lines_reports_every_configured_source() {
        let registry = EventEngineRegistry::new();
        let engine = registry.get_or_create("front_door", 1, 1, 1);
        engine
            .lock()
            .unwrap()
            .observe(&[crate::scoring::AdmittedGroup { group: "dog".into(), composite: 0.9 }]);

        let source_names = vec!["front_door".to_owned(), "back_yard".to_owned()];
        let lines = build_summary_lines(&registry, &source_names);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], ("front_door".to_owned(), "front_door: 1 events: dog".to_owned()));
        assert_eq!(lines[1], ("back_yard".to_owned(), "back_yard: No sound events".to_owned()));
    }
}
