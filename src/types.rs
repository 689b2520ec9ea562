//! Core types for the AURORA breadth engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: daily feature inputs, baselines, standardized features, composite
//! records, and the final per-date result.

use crate::band::Band;
use crate::error::EngineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Breadth feature identifier
///
/// Declaration order is the fixed priority order used to break ties when
/// ranking contributions (VPB, IPB, SBC, IPO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeatureId {
    /// Volume Participation Breadth (dollar-weighted)
    #[serde(rename = "VPB")]
    Vpb,
    /// Issue Participation Breadth (count-weighted)
    #[serde(rename = "IPB")]
    Ipb,
    /// Structural Breadth Confirmation (MA50/MA200)
    #[serde(rename = "SBC")]
    Sbc,
    /// Institutional Participation Overlay
    #[serde(rename = "IPO")]
    Ipo,
}

impl FeatureId {
    /// All features in priority order
    pub const ALL: [FeatureId; 4] = [FeatureId::Vpb, FeatureId::Ipb, FeatureId::Sbc, FeatureId::Ipo];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureId::Vpb => "VPB",
            FeatureId::Ipb => "IPB",
            FeatureId::Sbc => "SBC",
            FeatureId::Ipo => "IPO",
        }
    }

    /// Tie-break priority (lower ranks first)
    pub fn priority(&self) -> usize {
        match self {
            FeatureId::Vpb => 0,
            FeatureId::Ipb => 1,
            FeatureId::Sbc => 2,
            FeatureId::Ipo => 3,
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VPB" => Ok(FeatureId::Vpb),
            "IPB" => Ok(FeatureId::Ipb),
            "SBC" => Ok(FeatureId::Sbc),
            "IPO" => Ok(FeatureId::Ipo),
            other => Err(EngineError::InvalidInput(format!("unknown feature id: {other}"))),
        }
    }
}

/// A single raw feature value for one trading day.
///
/// `raw_value` is `None` when the source field was missing. No value is
/// ever interpolated in its place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureObservation {
    pub feature: FeatureId,
    pub date: NaiveDate,
    pub raw_value: Option<f64>,
}

/// Snapshot of a feature's rolling statistics, taken before the day's own
/// observation is appended.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Baseline {
    /// Rolling mean (absent for an empty window)
    pub mean: Option<f64>,
    /// Sample standard deviation (absent when n < 2 or variance is zero)
    pub std_dev: Option<f64>,
    /// Number of present observations in the window
    pub n: usize,
}

impl Baseline {
    /// Whether the baseline can standardize a value
    pub fn is_usable(&self) -> bool {
        self.n >= 2 && self.mean.is_some() && matches!(self.std_dev, Some(s) if s > 0.0)
    }
}

/// A feature value standardized against its baseline.
///
/// `z_value` is never clipped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardizedFeature {
    pub feature: FeatureId,
    pub z_value: Option<f64>,
    pub weight: f64,
    /// The raw value the z-score was computed from
    pub raw_value: Option<f64>,
    /// Baseline observation count used for this day
    pub n: usize,
}

/// Baseline completeness for a trading day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaselineStatus {
    /// Every feature has n >= N_min
    Complete,
    /// Some features have n < N_min
    Partial,
    /// No feature has n >= N_min
    Insufficient,
}

impl BaselineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineStatus::Complete => "COMPLETE",
            BaselineStatus::Partial => "PARTIAL",
            BaselineStatus::Insufficient => "INSUFFICIENT",
        }
    }
}

impl fmt::Display for BaselineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative direction of a standardized value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Elevated,
    Depressed,
    Neutral,
}

impl Direction {
    /// z above +0.5 is elevated, below -0.5 depressed
    pub fn from_z(z: f64) -> Self {
        if z > 0.5 {
            Direction::Elevated
        } else if z < -0.5 {
            Direction::Depressed
        } else {
            Direction::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Elevated => "elevated",
            Direction::Depressed => "depressed",
            Direction::Neutral => "neutral",
        }
    }
}

/// Weighted contribution of one present feature to the composite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: FeatureId,
    pub raw_value: f64,
    /// Unclipped z-score
    pub z_value: f64,
    pub weight: f64,
    /// weight * z_value
    pub contribution: f64,
    pub direction: Direction,
}

/// Composite score for one date before percentile ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScoreRecord {
    pub date: NaiveDate,
    /// Weight-renormalized composite; `None` when no feature is present
    pub composite_value: Option<f64>,
    /// Present features ordered by descending |contribution|
    pub contributing_features: Vec<FeatureContribution>,
    pub status: BaselineStatus,
}

/// The engine's externally consumed output for one trading day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmiResult {
    pub date: NaiveDate,
    /// Inverted percentile rank in [0, 100]; lower is healthier
    pub aurora_score: f64,
    pub band: Band,
    pub status: BaselineStatus,
    /// Contributing features ordered by descending |weight * z|
    pub explanation: Vec<FeatureContribution>,
    /// Raw composite before percentile ranking (diagnostic)
    pub composite_value: f64,
    /// Percentile rank of the composite against prior history
    pub percentile_rank: f64,
    /// Features with no standardized value today
    pub excluded_features: Vec<FeatureId>,
    /// z_VPB - z_IPB when both are present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpb_ipb_divergence: Option<f64>,
    /// Human-readable explanation
    pub narrative: String,
}

impl BmiResult {
    /// Whether breadth indicates healthy participation
    pub fn is_healthy(&self) -> bool {
        matches!(self.band, Band::Green | Band::LightGreen)
    }
}

/// Raw feature values for one trading day, as delivered by the feature
/// calculation layer.
///
/// A feature that is missing from the map, or mapped to `None`, is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyFeatures {
    pub date: NaiveDate,
    #[serde(default)]
    pub values: BTreeMap<FeatureId, Option<f64>>,
}

impl DailyFeatures {
    /// Create an input with every feature absent
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            values: BTreeMap::new(),
        }
    }

    /// Set a present value
    pub fn with(mut self, feature: FeatureId, value: f64) -> Self {
        self.values.insert(feature, Some(value));
        self
    }

    /// Mark a feature explicitly absent
    pub fn without(mut self, feature: FeatureId) -> Self {
        self.values.insert(feature, None);
        self
    }

    pub fn get(&self, feature: FeatureId) -> Option<f64> {
        self.values.get(&feature).copied().flatten()
    }

    pub fn observations(&self) -> impl Iterator<Item = FeatureObservation> + '_ {
        FeatureId::ALL.into_iter().map(move |feature| FeatureObservation {
            feature,
            date: self.date,
            raw_value: self.get(feature),
        })
    }

    /// Number of present feature values
    pub fn present_count(&self) -> usize {
        FeatureId::ALL.iter().filter(|f| self.get(**f).is_some()).count()
    }

    /// Reject non-finite values; they are neither present nor absent
    pub fn validate(&self) -> Result<(), EngineError> {
        for (feature, value) in &self.values {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(EngineError::InvalidInput(format!(
                        "{feature} on {} is not finite: {v}",
                        self.date
                    )));
                }
            }
        }
        Ok(())
    }
}
