//! Baseline state resolution
//!
//! Collapses per-feature baseline observation counts into a single
//! completeness status for the day.

use crate::types::BaselineStatus;

/// Resolve status from per-feature counts.
///
/// Every feature at or above `min_observations` is COMPLETE, none is
/// INSUFFICIENT, anything else PARTIAL. An empty slice is INSUFFICIENT.
pub fn resolve_status(counts: &[usize], min_observations: usize) -> BaselineStatus {
    let sufficient = counts.iter().filter(|n| **n >= min_observations).count();
    if sufficient == 0 {
        BaselineStatus::Insufficient
    } else if sufficient == counts.len() {
        BaselineStatus::Complete
    } else {
        BaselineStatus::Partial
    }
}
