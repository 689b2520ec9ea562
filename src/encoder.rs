//! Result encoding
//!
//! Wraps a deterministic [`BmiResult`] in an envelope carrying producer and
//! provenance metadata. The inner result never contains time- or
//! instance-dependent fields, so re-running a date yields an identical result
//! even though the envelope differs.

use crate::error::EngineError;
use crate::types::{BaselineStatus, BmiResult};
use crate::{AURORA_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope schema version
pub const ENVELOPE_VERSION: &str = "1.0.0";

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Provenance metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub computed_at_utc: String,
    /// True when the result was produced with incomplete baselines
    pub provisional: bool,
}

/// Published form of one day's result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub envelope_version: String,
    pub producer: Producer,
    pub provenance: Provenance,
    pub result: BmiResult,
}

/// Result encoder carrying a per-run instance id
pub struct ResultEncoder {
    instance_id: String,
}

impl Default for ResultEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn encode(&self, result: &BmiResult) -> ResultEnvelope {
        ResultEnvelope {
            envelope_version: ENVELOPE_VERSION.to_string(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: AURORA_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            provenance: Provenance {
                computed_at_utc: Utc::now().to_rfc3339(),
                provisional: result.status != BaselineStatus::Complete,
            },
            result: result.clone(),
        }
    }

    /// Encode to a single JSON line
    pub fn encode_to_json(&self, result: &BmiResult) -> Result<String, EngineError> {
        serde_json::to_string(&self.encode(result)).map_err(EngineError::JsonError)
    }

    /// Encode to indented JSON
    pub fn encode_to_json_pretty(&self, result: &BmiResult) -> Result<String, EngineError> {
        serde_json::to_string_pretty(&self.encode(result)).map_err(EngineError::JsonError)
    }
}
