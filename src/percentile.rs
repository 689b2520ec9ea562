//! Percentile ranking and inversion
//!
//! The composite is bounded to [0, 100] only here, by ranking it against the
//! prior composite history. The rank is then inverted so that strong breadth
//! maps to a low AURORA score.

use crate::baseline::{RollingWindow, WindowUpdate};
use crate::config::{MIN_COMPOSITE_HISTORY, ROLLING_WINDOW};
use crate::error::{DegenerateReason, EngineError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const COMPOSITE_SERIES: &str = "composite";

/// Percent of `history` values less than or equal to `x`.
///
/// Returns `None` when fewer than `min_history` values are available.
pub fn percentile_rank(x: f64, history: &[f64], min_history: usize) -> Option<f64> {
    if history.len() < min_history.max(1) {
        return None;
    }
    let at_or_below = history.iter().filter(|v| **v <= x).count();
    Some(at_or_below as f64 / history.len() as f64 * 100.0)
}

/// AURORA score from a percentile rank
pub fn invert(percentile: f64) -> f64 {
    (100.0 - percentile).clamp(0.0, 100.0)
}

/// Rolling history of composite values, one per scored date
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeHistory {
    window: RollingWindow,
}

impl Default for CompositeHistory {
    fn default() -> Self {
        Self::new(ROLLING_WINDOW)
    }
}

impl CompositeHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window: RollingWindow::new(window),
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.window.last_date()
    }

    /// The reference distribution for `date`: the history as it stood before
    /// `date` was recorded, so a full window still yields W values
    pub fn prior_values(&self, date: NaiveDate) -> Vec<f64> {
        self.window.values_prior_to(date)
    }

    pub fn ensure_in_order(&self, date: NaiveDate) -> Result<(), EngineError> {
        self.window.ensure_in_order(COMPOSITE_SERIES, date)
    }

    /// Record the composite for `date` (absent composites only mark the date)
    pub fn record(
        &mut self,
        date: NaiveDate,
        composite: Option<f64>,
        force: bool,
    ) -> Result<WindowUpdate, EngineError> {
        self.window.observe(COMPOSITE_SERIES, date, composite, force)
    }

    /// Rank `composite` against the history prior to `date`.
    ///
    /// Returns `(percentile_rank, aurora_score)`, or a degenerate error when
    /// the prior history is too short.
    pub fn rank(
        &self,
        date: NaiveDate,
        composite: f64,
    ) -> Result<(f64, f64), EngineError> {
        let prior = self.prior_values(date);
        let percentile =
            percentile_rank(composite, &prior, MIN_COMPOSITE_HISTORY).ok_or(EngineError::Degenerate {
                date,
                reason: DegenerateReason::InsufficientCompositeHistory {
                    available: prior.len(),
                    required: MIN_COMPOSITE_HISTORY,
                },
            })?;
        Ok((percentile, invert(percentile)))
    }
}
