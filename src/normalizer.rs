//! Feature standardization
//!
//! Converts a raw feature value into a z-score against its prior-window
//! baseline. The z-score is never clipped; a value undefined for lack of a
//! usable baseline stays `None` and is never coerced to zero.

use crate::config::EngineConfig;
use crate::types::{Baseline, FeatureObservation, StandardizedFeature};

/// Normalizer for converting raw observations to standardized features
pub struct Normalizer;

impl Normalizer {
    /// z = (x - mean) / std, or `None` if the value is absent, n < 2, or std is
    /// zero or undefined.
    pub fn z_score(raw_value: Option<f64>, baseline: &Baseline) -> Option<f64> {
        let x = raw_value?;
        if baseline.n < 2 {
            return None;
        }
        let mean = baseline.mean?;
        let std_dev = baseline.std_dev.filter(|s| *s > 0.0)?;
        let z = (x - mean) / std_dev;
        z.is_finite().then_some(z)
    }

    /// Standardize an observation, attaching its configured weight
    pub fn standardize(
        observation: &FeatureObservation,
        baseline: &Baseline,
        config: &EngineConfig,
    ) -> StandardizedFeature {
        StandardizedFeature {
            feature: observation.feature,
            z_value: Self::z_score(observation.raw_value, baseline),
            weight: config.weight(observation.feature),
            raw_value: observation.raw_value,
            n: baseline.n,
        }
    }
}
