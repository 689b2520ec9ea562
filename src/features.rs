//! Breadth feature derivation
//!
//! This module derives the four daily breadth features from raw market counts:
//! - VPB: advancing share of advancing + declining volume
//! - IPB: advancing share of advancing + declining issues
//! - SBC: mean share of stocks above their 50- and 200-day averages
//! - IPO: share of stocks whose relative volume spikes past both their own
//!   threshold and the universe median
//!
//! Any input that cannot produce a meaningful value yields an absent feature.

use crate::types::{DailyFeatures, FeatureId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Relative volume treated as unusual when no per-stock threshold is given
pub const DEFAULT_REL_VOL_THRESHOLD: f64 = 2.0;

/// Raw breadth counts for one trading day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreadthSnapshot {
    pub date: NaiveDate,
    #[serde(default)]
    pub advancing_volume: Option<f64>,
    #[serde(default)]
    pub declining_volume: Option<f64>,
    #[serde(default)]
    pub advancing_issues: Option<u64>,
    #[serde(default)]
    pub declining_issues: Option<u64>,
    /// Percent of stocks above their 50-day average (0-100)
    #[serde(default)]
    pub pct_above_ma50: Option<f64>,
    /// Percent of stocks above their 200-day average (0-100)
    #[serde(default)]
    pub pct_above_ma200: Option<f64>,
    /// Per-stock volume relative to its own recent average
    #[serde(default)]
    pub relative_volumes: Option<Vec<f64>>,
    /// Per-stock unusual-volume thresholds, same order as `relative_volumes`
    #[serde(default)]
    pub relative_volume_thresholds: Option<Vec<f64>>,
    /// Cross-sectional median relative volume; computed when absent
    #[serde(default)]
    pub universe_median: Option<f64>,
}

/// Feature deriver for computing breadth features
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive all four features for a day
    pub fn derive(snapshot: &BreadthSnapshot) -> DailyFeatures {
        let values = [
            (FeatureId::Vpb, compute_vpb(snapshot)),
            (FeatureId::Ipb, compute_ipb(snapshot)),
            (FeatureId::Sbc, compute_sbc(snapshot)),
            (FeatureId::Ipo, compute_ipo(snapshot)),
        ];

        let mut features = DailyFeatures::new(snapshot.date);
        for (feature, value) in values {
            match value {
                Some(v) => features = features.with(feature, v),
                None => {
                    tracing::debug!(feature = %feature, date = %snapshot.date, "feature not derivable");
                    features = features.without(feature);
                }
            }
        }
        features
    }
}

fn share(up: f64, down: f64) -> Option<f64> {
    if !up.is_finite() || !down.is_finite() || up < 0.0 || down < 0.0 {
        return None;
    }
    let total = up + down;
    (total > 0.0).then(|| up / total)
}

/// V_adv / (V_adv + V_dec)
fn compute_vpb(snapshot: &BreadthSnapshot) -> Option<f64> {
    share(snapshot.advancing_volume?, snapshot.declining_volume?)
}

/// N_adv / (N_adv + N_dec)
fn compute_ipb(snapshot: &BreadthSnapshot) -> Option<f64> {
    share(
        snapshot.advancing_issues? as f64,
        snapshot.declining_issues? as f64,
    )
}

/// Mean of the MA50 / MA200 percentages scaled to [0, 1]; either alone if the
/// other is missing
fn compute_sbc(snapshot: &BreadthSnapshot) -> Option<f64> {
    let valid = |p: Option<f64>| p.filter(|v| (0.0..=100.0).contains(v));
    match (snapshot.pct_above_ma50, snapshot.pct_above_ma200) {
        (Some(_), Some(_)) => {
            let ma50 = valid(snapshot.pct_above_ma50)?;
            let ma200 = valid(snapshot.pct_above_ma200)?;
            Some((ma50 + ma200) / 2.0 / 100.0)
        }
        (ma50, ma200) => valid(ma50.or(ma200)).map(|p| p / 100.0),
    }
}

/// Fraction of stocks passing the dual relative-volume filter
fn compute_ipo(snapshot: &BreadthSnapshot) -> Option<f64> {
    let rel_vols = snapshot.relative_volumes.as_deref()?;
    if rel_vols.is_empty() || rel_vols.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let thresholds: Vec<f64> = match snapshot.relative_volume_thresholds.as_deref() {
        Some(t) if t.len() == rel_vols.len() => t.to_vec(),
        Some(_) => return None,
        None => vec![DEFAULT_REL_VOL_THRESHOLD; rel_vols.len()],
    };
    let median = match snapshot.universe_median {
        Some(m) => m,
        None => median(rel_vols)?,
    };

    let spikes = rel_vols
        .iter()
        .zip(&thresholds)
        .filter(|(v, t)| **v > **t && **v > median)
        .count();
    Some(spikes as f64 / rel_vols.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
