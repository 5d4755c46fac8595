//! Latency classification.
//!
//! Pure functions of observable queue state — no memory across calls, so the
//! batching policy stays testable apart from the dispatch loop.

use crate::config::SchedulerConfig;

/// A request whose deadline is below the bypass threshold must not wait to
/// be grouped.
pub(crate) fn is_critical(deadline_ms: Option<u64>, cfg: &SchedulerConfig) -> bool {
    matches!(deadline_ms, Some(d) if d < cfg.critical_deadline_threshold_ms)
}

/// Batch size as a step function of the tightest deadline among buffered
/// non-critical requests.
///
/// Tighter pending deadlines shrink the batch toward the floor (favoring
/// latency); looser or absent deadlines grow it toward the ceiling (favoring
/// throughput). Monotone non-decreasing in the deadline. The step thresholds
/// are tunable multiples of the bypass threshold, not correctness
/// requirements.
pub(crate) fn suggested_batch_size(
    tightest_deadline_ms: Option<u64>,
    cfg: &SchedulerConfig,
) -> usize {
    let floor = cfg.batch_size_floor.max(1);
    let ceiling = cfg.batch_size_ceiling.max(floor);
    let size = match tightest_deadline_ms {
        None => ceiling,
        Some(d) => {
            let threshold = cfg.critical_deadline_threshold_ms.max(1);
            if d < threshold.saturating_mul(2) {
                floor
            } else if d < threshold.saturating_mul(4) {
                (ceiling / 4).max(floor)
            } else if d < threshold.saturating_mul(8) {
                (ceiling / 2).max(floor)
            } else {
                ceiling
            }
        }
    };
    size.clamp(floor, ceiling)
}
