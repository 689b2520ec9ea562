//! State and result persistence
//!
//! The engine itself performs no I/O. A [`StateStore`] loads and saves the
//! engine's rolling state and receives each published result.
//!
//! [`JsonFileStore`] layout:
//! ```text
//! state.json     engine state, rewritten atomically (tmp file then rename)
//! results.ndjson one BmiResult per line, appended
//! ```

use crate::engine::EngineState;
use crate::error::EngineError;
use crate::types::BmiResult;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Storage collaborator for engine state and results
pub trait StateStore {
    /// Previously saved state, or `None` on first run
    fn load_state(&self) -> Result<Option<EngineState>, EngineError>;

    fn save_state(&mut self, state: &EngineState) -> Result<(), EngineError>;

    fn append_result(&mut self, result: &BmiResult) -> Result<(), EngineError>;

    /// Stored results in date order; a re-published date supersedes earlier
    /// copies
    fn load_results(&self) -> Result<Vec<BmiResult>, EngineError>;
}

/// In-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Option<EngineState>,
    results: Vec<BmiResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load_state(&self) -> Result<Option<EngineState>, EngineError> {
        Ok(self.state.clone())
    }

    fn save_state(&mut self, state: &EngineState) -> Result<(), EngineError> {
        self.state = Some(state.clone());
        Ok(())
    }

    fn append_result(&mut self, result: &BmiResult) -> Result<(), EngineError> {
        self.results.push(result.clone());
        Ok(())
    }

    fn load_results(&self) -> Result<Vec<BmiResult>, EngineError> {
        Ok(latest_per_date(self.results.iter().cloned()))
    }
}

/// JSON file store rooted in a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    state_path: PathBuf,
    results_path: PathBuf,
}

impl JsonFileStore {
    pub const STATE_FILE: &'static str = "state.json";
    pub const RESULTS_FILE: &'static str = "results.ndjson";

    /// Store files under `dir`, creating it if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            state_path: dir.join(Self::STATE_FILE),
            results_path: dir.join(Self::RESULTS_FILE),
        })
    }

    /// Store with explicit file paths
    pub fn with_paths(state_path: impl Into<PathBuf>, results_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            results_path: results_path.into(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }
}

impl StateStore for JsonFileStore {
    fn load_state(&self) -> Result<Option<EngineState>, EngineError> {
        if !self.state_path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.state_path)?;
        let state = serde_json::from_str(&json).map_err(|e| {
            EngineError::ParseError(format!("{}: {}", self.state_path.display(), e))
        })?;
        Ok(Some(state))
    }

    fn save_state(&mut self, state: &EngineState) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp_path = self.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.state_path)?;
        tracing::debug!(path = %self.state_path.display(), "state saved");
        Ok(())
    }

    fn append_result(&mut self, result: &BmiResult) -> Result<(), EngineError> {
        let line = serde_json::to_string(result)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.results_path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn load_results(&self) -> Result<Vec<BmiResult>, EngineError> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.results_path)?;
        let mut results = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let result = serde_json::from_str::<BmiResult>(trimmed).map_err(|e| {
                EngineError::ParseError(format!(
                    "{} line {}: {}",
                    self.results_path.display(),
                    line_num + 1,
                    e
                ))
            })?;
            results.push(result);
        }
        Ok(latest_per_date(results))
    }
}

fn latest_per_date(results: impl IntoIterator<Item = BmiResult>) -> Vec<BmiResult> {
    let mut by_date = BTreeMap::new();
    for result in results {
        by_date.insert(result.date, result);
    }
    by_date.into_values().collect()
}
