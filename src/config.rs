//! Frozen engine constants
//!
//! Weights, thresholds and window sizes are conceptual allocations, not
//! fitted parameters. They are carried in an immutable [`EngineConfig`]
//! injected into the engine rather than read from module state.

use crate::error::EngineError;
use crate::types::FeatureId;
use serde::{Deserialize, Serialize};

/// Rolling window length in trading days (~3 months)
pub const ROLLING_WINDOW: usize = 63;

/// Minimum observations for a feature baseline to count as complete (~1 month)
pub const MIN_OBSERVATIONS: usize = 21;

/// Minimum prior composite values needed for a percentile rank
pub const MIN_COMPOSITE_HISTORY: usize = 2;

/// Upper bounds of GREEN, LIGHT_GREEN and YELLOW
pub const BAND_THRESHOLDS: [f64; 3] = [25.0, 50.0, 75.0];

/// |z_VPB - z_IPB| above which the divergence is reported
pub const VPB_IPB_DIVERGENCE_WARN: f64 = 1.0;

/// Drivers named in the narrative explanation
pub const DEFAULT_TOP_DRIVERS: usize = 2;

/// Composite feature weights
pub const WEIGHTS: Weights = Weights {
    vpb: 0.30,
    ipb: 0.25,
    sbc: 0.25,
    ipo: 0.20,
};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Per-feature composite weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    #[serde(rename = "VPB")]
    vpb: f64,
    #[serde(rename = "IPB")]
    ipb: f64,
    #[serde(rename = "SBC")]
    sbc: f64,
    #[serde(rename = "IPO")]
    ipo: f64,
}

impl Weights {
    pub fn get(&self, feature: FeatureId) -> f64 {
        match feature {
            FeatureId::Vpb => self.vpb,
            FeatureId::Ipb => self.ipb,
            FeatureId::Sbc => self.sbc,
            FeatureId::Ipo => self.ipo,
        }
    }

    pub fn sum(&self) -> f64 {
        FeatureId::ALL.iter().map(|f| self.get(*f)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, f64)> + '_ {
        FeatureId::ALL.into_iter().map(move |f| (f, self.get(f)))
    }
}

impl Default for Weights {
    fn default() -> Self {
        WEIGHTS
    }
}

/// Immutable engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    window: usize,
    min_observations: usize,
    weights: Weights,
    band_thresholds: [f64; 3],
    divergence_warn: f64,
    top_drivers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::aurora()
    }
}

impl EngineConfig {
    /// The frozen AURORA constants
    pub const fn aurora() -> Self {
        Self {
            window: ROLLING_WINDOW,
            min_observations: MIN_OBSERVATIONS,
            weights: WEIGHTS,
            band_thresholds: BAND_THRESHOLDS,
            divergence_warn: VPB_IPB_DIVERGENCE_WARN,
            top_drivers: DEFAULT_TOP_DRIVERS,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn min_observations(&self) -> usize {
        self.min_observations
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn weight(&self, feature: FeatureId) -> f64 {
        self.weights.get(feature)
    }

    pub fn band_thresholds(&self) -> [f64; 3] {
        self.band_thresholds
    }

    pub fn divergence_warn(&self) -> f64 {
        self.divergence_warn
    }

    pub fn top_drivers(&self) -> usize {
        self.top_drivers
    }

    /// Check the structural invariants of the constants
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.window == 0 {
            return Err(EngineError::InvalidConfig("window must be positive".into()));
        }
        if self.min_observations > self.window {
            return Err(EngineError::InvalidConfig(format!(
                "min_observations {} exceeds window {}",
                self.min_observations, self.window
            )));
        }
        if let Some((feature, w)) = self.weights.iter().find(|(_, w)| !(*w > 0.0)) {
            return Err(EngineError::InvalidConfig(format!(
                "weight for {feature} must be positive, got {w}"
            )));
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::InvalidConfig(format!(
                "weights must sum to 1.0, got {sum}"
            )));
        }
        let [a, b, c] = self.band_thresholds;
        if !(0.0 < a && a < b && b < c && c < 100.0) {
            return Err(EngineError::InvalidConfig(format!(
                "band thresholds must be strictly increasing inside (0, 100): {:?}",
                self.band_thresholds
            )));
        }
        Ok(())
    }
}
