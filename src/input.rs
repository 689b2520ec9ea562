//! Daily input records
//!
//! Input arrives either as already-computed feature values
//! (`{"date": .., "values": {"VPB": ..}}`) or as raw breadth counts that are
//! derived into features here. Both shapes can be mixed in one NDJSON stream
//! or JSON array.

use crate::error::EngineError;
use crate::features::{BreadthSnapshot, FeatureDeriver};
use crate::types::DailyFeatures;
use chrono::NaiveDate;
use serde_json::Value;

/// One day of engine input
#[derive(Debug, Clone, PartialEq)]
pub enum InputRecord {
    Features(DailyFeatures),
    Breadth(BreadthSnapshot),
}

impl InputRecord {
    pub fn date(&self) -> NaiveDate {
        match self {
            InputRecord::Features(f) => f.date,
            InputRecord::Breadth(b) => b.date,
        }
    }

    /// Feature values for the day, deriving them if needed
    pub fn to_features(&self) -> DailyFeatures {
        match self {
            InputRecord::Features(f) => f.clone(),
            InputRecord::Breadth(b) => FeatureDeriver::derive(b),
        }
    }

    fn from_value(value: Value) -> Result<Self, EngineError> {
        if !value.is_object() {
            return Err(EngineError::ParseError("record is not a JSON object".into()));
        }
        if value.get("values").is_some() {
            Ok(InputRecord::Features(serde_json::from_value(value)?))
        } else {
            Ok(InputRecord::Breadth(serde_json::from_value(value)?))
        }
    }
}

/// Input reader for the supported record encodings
pub struct InputReader;

impl InputReader {
    /// Parse a JSON array of records
    pub fn parse_array(json: &str) -> Result<Vec<InputRecord>, EngineError> {
        let values: Vec<Value> = serde_json::from_str(json)?;
        values
            .into_iter()
            .enumerate()
            .map(|(idx, v)| {
                InputRecord::from_value(v).map_err(|e| {
                    EngineError::ParseError(format!("Failed to parse record {}: {}", idx, e))
                })
            })
            .collect()
    }

    /// Parse NDJSON (newline-delimited JSON) records, skipping blank lines
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<InputRecord>, EngineError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<Value>(trimmed)
                .map_err(EngineError::from)
                .and_then(InputRecord::from_value);
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(EngineError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Check a batch without running it
    pub fn validate(records: &[InputRecord]) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut previous: Option<NaiveDate> = None;

        for (index, record) in records.iter().enumerate() {
            let date = record.date();
            let features = record.to_features();

            if let Err(e) = features.validate() {
                issues.push(ValidationIssue::new(index, date, e.to_string()));
            }
            if features.present_count() == 0 {
                issues.push(ValidationIssue::new(
                    index,
                    date,
                    "no feature values present".to_string(),
                ));
            }
            match previous {
                Some(p) if date == p => issues.push(ValidationIssue::new(
                    index,
                    date,
                    "duplicate date".to_string(),
                )),
                Some(p) if date < p => issues.push(ValidationIssue::new(
                    index,
                    date,
                    format!("date precedes previous record {p}"),
                )),
                _ => {}
            }
            previous = Some(previous.map_or(date, |p| p.max(date)));
        }
        issues
    }
}

/// A problem found in one input record
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ValidationIssue {
    pub index: usize,
    pub date: NaiveDate,
    pub message: String,
}

impl ValidationIssue {
    fn new(index: usize, date: NaiveDate, message: String) -> Self {
        Self {
            index,
            date,
            message,
        }
    }
}
