use shared::{AnalysisSummary, ClassificationLabel, TileResult};

use super::round_to;

pub const DEFAULT_MAX_TILES: usize = 64;

/// Tie-break order for the dominant class: on equal counts the earlier label wins.
pub const DOMINANCE_PRIORITY: [ClassificationLabel; 3] = [
    ClassificationLabel::Healthy,
    ClassificationLabel::MildInfection,
    ClassificationLabel::SevereInfection,
];

/// Keeps the first `max_count` items and drops the rest.
///
/// Large images are only partially covered: this bounds cost and response
/// size and is not an error.
pub fn limit<T>(mut tiles: Vec<T>, max_count: usize) -> Vec<T> {
    tiles.truncate(max_count);
    tiles
}

pub fn summarize(tiles: &[TileResult]) -> AnalysisSummary {
    let count = |label: ClassificationLabel| {
        tiles.iter().filter(|t| t.predicted_class == label).count() as u32
    };
    let healthy = count(ClassificationLabel::Healthy);
    let mild = count(ClassificationLabel::MildInfection);
    let severe = count(ClassificationLabel::SevereInfection);
    let total = tiles.len() as u32;

    let overall_health_score = if total > 0 {
        round_to(100.0 * healthy as f64 / total as f64, 1)
    } else {
        0.0
    };

    let count_of = |label: ClassificationLabel| match label {
        ClassificationLabel::Healthy => healthy,
        ClassificationLabel::MildInfection => mild,
        ClassificationLabel::SevereInfection => severe,
    };
    let mut dominant_class = DOMINANCE_PRIORITY[0];
    for label in DOMINANCE_PRIORITY.into_iter().skip(1) {
        if count_of(label) > count_of(dominant_class) {
            dominant_class = label;
        }
    }

    AnalysisSummary {
        chunks_total: total,
        chunks_healthy: healthy,
        chunks_mild: mild,
        chunks_severe: severe,
        overall_health_score,
        dominant_class,
    }
}
