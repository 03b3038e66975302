use crate::models::config::Thresholds;
use crate::models::metrics::LatencyStatus;

/// Maps a latency (None = unreachable) to its tier.
///
/// Bands are lower-inclusive: `[0, excellent)` excellent, `[excellent, good)`
/// good, `[good, fair)` fair, `[fair, ..)` poor. Inverted bounds are clamped
/// with [`Thresholds::normalized`] before comparison.
pub fn classify(latency_ms: Option<f64>, thresholds: &Thresholds) -> LatencyStatus {
    let Some(ms) = latency_ms else {
        return LatencyStatus::Offline;
    };
    let bounds = thresholds.normalized();

    if ms < bounds.excellent_ms {
        LatencyStatus::Excellent
    } else if ms < bounds.good_ms {
        LatencyStatus::Good
    } else if ms < bounds.fair_ms {
        LatencyStatus::Fair
    } else {
        LatencyStatus::Poor
    }
}
