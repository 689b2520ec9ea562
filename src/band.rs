//! Band classification
//!
//! Maps an AURORA score in [0, 100] to one of four ordered health bands.
//! A score exactly on a threshold belongs to the lower (healthier) band.

use crate::config::BAND_THRESHOLDS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health band of an AURORA score (lower score is healthier)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Band {
    /// Broad, healthy participation
    Green,
    /// Moderate participation
    LightGreen,
    /// Narrowing participation
    Yellow,
    /// Weak participation
    Red,
}

impl Band {
    /// All bands from healthiest to weakest
    pub const ALL: [Band; 4] = [Band::Green, Band::LightGreen, Band::Yellow, Band::Red];

    /// Classify with the standard 25 / 50 / 75 thresholds
    pub fn classify(score: f64) -> Band {
        Band::from_score(score, BAND_THRESHOLDS)
    }

    /// Classify against explicit upper bounds for GREEN, LIGHT_GREEN and YELLOW.
    ///
    /// Scores below 0 or above 100 are clamped first.
    pub fn from_score(score: f64, thresholds: [f64; 3]) -> Band {
        let score = score.clamp(0.0, 100.0);
        let [green, light_green, yellow] = thresholds;
        if score <= green {
            Band::Green
        } else if score <= light_green {
            Band::LightGreen
        } else if score <= yellow {
            Band::Yellow
        } else {
            Band::Red
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Green => "GREEN",
            Band::LightGreen => "LIGHT_GREEN",
            Band::Yellow => "YELLOW",
            Band::Red => "RED",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Band::Green => "Strong breadth, broad participation",
            Band::LightGreen => "Moderate breadth, healthy participation",
            Band::Yellow => "Weakening breadth, narrowing participation",
            Band::Red => "Weak breadth, concentrated participation",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
