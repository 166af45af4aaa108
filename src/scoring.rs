//! Scoring pipeline — noise filter, group composite scoring, top-k ranking,
//! and per-group admission.
//!
//! Grounded on `yamcam5/yamcam_functions.py`'s `rank_sounds`,
//! `group_scores_by_prefix`, and `calculate_composite_scores`: scores below
//! `noise_threshold` are dropped first, survivors are
//! bucketed by taxonomy group, each group gets one composite score, the
//! composite scores are ranked and truncated to the top `k`, and only
//! groups both tracked and above their configured (or default) minimum
//! score are admitted as candidate detections for the event state machine.

use std::collections::HashMap;

use crate::config::SoundsConfig;
use crate::inference::ScoreVector;
use crate::taxonomy::Taxonomy;

/// One per-class score that survived the noise floor, with its class name
/// and group already resolved — this is also the unit written to the CSV
/// audit log per class (yamcam5's `rank_sounds` writes one row per
/// surviving class here, separate from event start/stop rows).
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDetection {
    pub class_name: String,
    pub group: String,
    pub score: f32,
}

/// One group's composite score for this window.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupScore {
    pub group: String,
    pub composite: f32,
    pub max_class_score: f32,
    pub contributing_count: usize,
}

/// Drop every score strictly below `noise_threshold` (a score equal to the
/// threshold survives), and resolve the surviving indices against the
/// taxonomy.
pub fn filter_noise(
    taxonomy: &Taxonomy,
    scores: &ScoreVector,
    noise_threshold: f32,
) -> Vec<ClassDetection> {
    scores
        .as_slice()
        .iter()
        .enumerate()
        .filter(|(_, &score)| score >= noise_threshold)
        .filter_map(|(index, &score)| {
            taxonomy.get(index).map(|class| ClassDetection {
                class_name: class.full_name.clone(),
                group: class.group.clone(),
                score,
            })
        })
        .collect()
}

/// Composite rule from `calculate_composite_scores`: if the group's max
/// class score exceeds 0.7 the composite is that max unchanged; otherwise
/// it's the max nudged up by 0.05 per contributing class, capped at 0.95.
fn composite_for_group(scores: &[f32]) -> (f32, usize) {
    let max = scores.iter().copied().fold(f32::MIN, f32::max);
    let composite = if max > 0.7 {
        max
    } else {
        (max + 0.05 * scores.len() as f32).min(0.95)
    };
    (composite, scores.len())
}

/// Bucket surviving detections by group and compute one composite score per
/// group, per `group_scores_by_prefix` + `calculate_composite_scores`.
pub fn composite_scores_by_group(detections: &[ClassDetection]) -> Vec<GroupScore> {
    let mut by_group: HashMap<&str, Vec<f32>> = HashMap::new();
    for d in detections {
        by_group.entry(d.group.as_str()).or_default().push(d.score);
    }

    let mut groups: Vec<GroupScore> = by_group
        .into_iter()
        .map(|(group, scores)| {
            let max_class_score = scores.iter().copied().fold(f32::MIN, f32::max);
            let (composite, contributing_count) = composite_for_group(&scores);
            GroupScore {
                group: group.to_owned(),
                composite,
                max_class_score,
                contributing_count,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.composite
            .partial_cmp(&a.composite)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.group.cmp(&b.group))
    });
    groups
}

/// Truncate to the top `k` groups by composite score (already sorted
/// descending by [`composite_scores_by_group`]).
pub fn top_k(groups: Vec<GroupScore>, k: usize) -> Vec<GroupScore> {
    let mut groups = groups;
    groups.truncate(k);
    groups
}

/// A group that cleared the noise floor, ranking, and its own admission
/// threshold — the candidate set fed to the event state machine each window.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmittedGroup {
    pub group: String,
    pub composite: f32,
}

/// Admit only tracked groups whose composite score clears their configured
/// (or default) minimum score — the final admission step before the event
/// state machine.
pub fn admit(groups: &[GroupScore], sounds: &SoundsConfig) -> Vec<AdmittedGroup> {
    groups
        .iter()
        .filter(|g| sounds.is_tracked(&g.group))
        .filter(|g| g.composite >= sounds.min_score_for(&g.group))
        .map(|g| AdmittedGroup { group: g.group.clone(), composite: g.composite })
        .collect()
}
