//! Aurora BMI - Deterministic daily market breadth health score
//!
//! Aurora turns four daily breadth features into a bounded, explainable score
//! through a deterministic pipeline: rolling baselines → unclipped
//! standardization → weight-renormalized composite → inverted percentile rank
//! → band classification, with a ranked explanation of the drivers.
//!
//! Lower scores are healthier: GREEN means broad participation, RED means weak
//! and concentrated participation.
//!
//! ## Modules
//!
//! - **Engine**: [`BmiEngine`] scores one trading day at a time and owns all
//!   rolling state
//! - **Features**: derive VPB, IPB, SBC and IPO from raw breadth counts
//! - **Store**: persist engine state and published results

pub mod band;
pub mod baseline;
pub mod composite;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod explain;
pub mod features;
pub mod input;
pub mod normalizer;
pub mod percentile;
pub mod status;
pub mod store;
pub mod types;

pub use band::Band;
pub use config::{EngineConfig, Weights};
pub use engine::{score_ndjson, BmiEngine, DayOutcome, EngineState};
pub use error::{DegenerateReason, EngineError};
pub use types::{BaselineStatus, BmiResult, DailyFeatures, FeatureId};

/// Aurora version embedded in every result envelope
pub const AURORA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for result envelopes
pub const PRODUCER_NAME: &str = "aurora-bmi";
