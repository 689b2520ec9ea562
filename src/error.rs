//! Error types for the AURORA breadth engine

use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during computation
///
/// Missing feature values and short baselines are not errors; they are
/// folded into the result's status. Only structural impossibilities surface
/// here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No score could be produced for {date}: {reason}")]
    Degenerate {
        date: NaiveDate,
        reason: DegenerateReason,
    },

    #[error("Out-of-order update for {series}: {date} precedes last applied date {last}")]
    OutOfOrder {
        series: String,
        date: NaiveDate,
        last: NaiveDate,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True when no number could be produced at all for the date
    pub fn is_degenerate(&self) -> bool {
        matches!(self, EngineError::Degenerate { .. })
    }

    /// True for duplicate or out-of-order store updates
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, EngineError::OutOfOrder { .. })
    }
}

/// Why a date produced no score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateReason {
    /// Every feature was absent or lacked a usable baseline
    NoFeaturesPresent,
    /// Too few prior composite values to rank against
    InsufficientCompositeHistory { available: usize, required: usize },
}

impl fmt::Display for DegenerateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegenerateReason::NoFeaturesPresent => {
                f.write_str("no standardized feature available for the composite")
            }
            DegenerateReason::InsufficientCompositeHistory {
                available,
                required,
            } => write!(
                f,
                "composite history has {available} prior observations, {required} required"
            ),
        }
    }
}
