//! Engine orchestration
//!
//! [`BmiEngine`] owns every piece of rolling state and runs one trading day at
//! a time through the stages:
//! 1. BaselineStore - prior-window baseline per feature, then append
//! 2. Normalizer - unclipped z-scores
//! 3. Status resolver - per-feature sufficiency folded into one status
//! 4. CompositeScorer - weight-renormalized composite
//! 5. CompositeHistory - percentile rank against prior composites, inverted
//! 6. Band classifier and explanation ranking

use crate::band::Band;
use crate::baseline::BaselineStore;
use crate::composite::CompositeScorer;
use crate::config::EngineConfig;
use crate::encoder::ResultEncoder;
use crate::error::{DegenerateReason, EngineError};
use crate::explain::{narrative, NarrativeContext};
use crate::input::InputReader;
use crate::normalizer::Normalizer;
use crate::percentile::CompositeHistory;
use crate::status::resolve_status;
use crate::types::{BmiResult, DailyFeatures, FeatureId, StandardizedFeature};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Everything needed to resume an engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub config: EngineConfig,
    pub baselines: BaselineStore,
    pub composites: CompositeHistory,
    #[serde(default)]
    pub last_date: Option<NaiveDate>,
}

/// Outcome of one day in a batch
#[derive(Debug)]
pub struct DayOutcome {
    pub date: NaiveDate,
    pub outcome: Result<BmiResult, EngineError>,
}

impl DayOutcome {
    pub fn result(&self) -> Option<&BmiResult> {
        self.outcome.as_ref().ok()
    }
}

/// Stateful daily breadth scorer
#[derive(Debug, Clone)]
pub struct BmiEngine {
    config: EngineConfig,
    baselines: BaselineStore,
    composites: CompositeHistory,
    last_date: Option<NaiveDate>,
}

impl Default for BmiEngine {
    fn default() -> Self {
        Self::fresh(EngineConfig::aurora())
    }
}

impl BmiEngine {
    /// Create an engine with the standard constants and empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with explicit constants
    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::fresh(config))
    }

    fn fresh(config: EngineConfig) -> Self {
        Self {
            config,
            baselines: BaselineStore::new(config.window()),
            composites: CompositeHistory::new(config.window()),
            last_date: None,
        }
    }

    /// Resume from previously exported state
    pub fn restore(state: EngineState) -> Result<Self, EngineError> {
        state.config.validate()?;
        let window = state.config.window();
        if state.baselines.window_size() != window || state.composites.capacity() != window {
            return Err(EngineError::InvalidConfig(format!(
                "stored windows do not match configured window {window}"
            )));
        }

        let mut applied = Vec::with_capacity(FeatureId::ALL.len() + 1);
        for feature in FeatureId::ALL {
            let stored = state.baselines.window(feature).ok_or_else(|| {
                EngineError::InvalidConfig(format!("stored state has no {feature} window"))
            })?;
            if stored.capacity() != window {
                return Err(EngineError::InvalidConfig(format!(
                    "{feature} window capacity {} does not match configured window {window}",
                    stored.capacity()
                )));
            }
            applied.push((feature.as_str(), stored.last_date()));
        }
        applied.push(("composite", state.composites.last_date()));

        for (series, series_last) in applied {
            if let Some(series_last) = series_last {
                if state.last_date.map_or(true, |last| last < series_last) {
                    return Err(EngineError::InvalidConfig(format!(
                        "{series} was applied through {series_last}, after stored last date {}",
                        state
                            .last_date
                            .map_or_else(|| "none".to_string(), |d| d.to_string())
                    )));
                }
            }
        }

        Ok(Self {
            config: state.config,
            baselines: state.baselines,
            composites: state.composites,
            last_date: state.last_date,
        })
    }

    pub fn export_state(&self) -> EngineState {
        EngineState {
            config: self.config,
            baselines: self.baselines.clone(),
            composites: self.composites.clone(),
            last_date: self.last_date,
        }
    }

    /// Load engine state from JSON
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let state: EngineState = serde_json::from_str(json)?;
        Self::restore(state)
    }

    /// Serialize engine state to JSON
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(&self.export_state())?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    pub fn composite_history(&self) -> &CompositeHistory {
        &self.composites
    }

    /// Latest date applied to the engine
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    /// Score one trading day.
    ///
    /// Days must arrive in date order. Re-running the latest date without
    /// `force` leaves all windows untouched; with `force` the day's slot is
    /// replaced by the new values. A degenerate day still advances the
    /// windows but yields [`EngineError::Degenerate`] instead of a result.
    pub fn process(&mut self, input: &DailyFeatures, force: bool) -> Result<BmiResult, EngineError> {
        input.validate()?;
        let date = input.date;

        // Reject before touching any window
        self.baselines.ensure_in_order(date)?;
        self.composites.ensure_in_order(date)?;

        let mut standardized: Vec<StandardizedFeature> = Vec::with_capacity(4);
        for observation in input.observations() {
            let baseline = self.baselines.apply(&observation, force)?;
            let feature = Normalizer::standardize(&observation, &baseline, &self.config);
            tracing::debug!(
                feature = %feature.feature,
                %date,
                raw = ?feature.raw_value,
                z = ?feature.z_value,
                n = feature.n,
                "standardized"
            );
            standardized.push(feature);
        }

        let counts: Vec<usize> = standardized
            .iter()
            .map(|f| if f.raw_value.is_some() { f.n } else { 0 })
            .collect();
        let status = resolve_status(&counts, self.config.min_observations());

        let record = CompositeScorer::score(date, &standardized, status);
        self.composites.record(date, record.composite_value, force)?;
        self.last_date = Some(self.last_date.map_or(date, |last| last.max(date)));

        let Some(composite) = record.composite_value else {
            tracing::warn!(%date, "no standardized features, day not scored");
            return Err(EngineError::Degenerate {
                date,
                reason: DegenerateReason::NoFeaturesPresent,
            });
        };

        let (percentile_rank, aurora_score) = match self.composites.rank(date, composite) {
            Ok(ranked) => ranked,
            Err(e) => {
                tracing::warn!(%date, composite, error = %e, "day not scored");
                return Err(e);
            }
        };

        let band = Band::from_score(aurora_score, self.config.band_thresholds());
        let excluded_features = CompositeScorer::excluded(&standardized);
        let vpb_ipb_divergence = CompositeScorer::vpb_ipb_divergence(&standardized);
        let narrative = narrative(
            &NarrativeContext {
                band,
                status,
                ranked: &record.contributing_features,
                excluded: &excluded_features,
                vpb_ipb_divergence,
            },
            &self.config,
        );

        tracing::info!(
            %date,
            score = aurora_score,
            band = %band,
            status = %status,
            composite,
            "scored"
        );

        Ok(BmiResult {
            date,
            aurora_score,
            band,
            status,
            explanation: record.contributing_features,
            composite_value: composite,
            percentile_rank,
            excluded_features,
            vpb_ipb_divergence,
            narrative,
        })
    }

    /// Score many days in date order.
    ///
    /// Degenerate days are collected as outcomes; any other error stops the
    /// batch.
    pub fn process_batch(
        &mut self,
        inputs: &[DailyFeatures],
        force: bool,
    ) -> Result<Vec<DayOutcome>, EngineError> {
        let mut ordered: Vec<&DailyFeatures> = inputs.iter().collect();
        ordered.sort_by_key(|input| input.date);

        let mut outcomes = Vec::with_capacity(ordered.len());
        for input in ordered {
            match self.process(input, force) {
                Err(e) if !e.is_degenerate() => return Err(e),
                outcome => outcomes.push(DayOutcome {
                    date: input.date,
                    outcome,
                }),
            }
        }
        Ok(outcomes)
    }
}

/// Score an NDJSON series from scratch, returning one JSON envelope per
/// scored day.
///
/// # Example
/// ```ignore
/// let envelopes = score_ndjson(&std::fs::read_to_string("breadth.ndjson")?)?;
/// ```
pub fn score_ndjson(ndjson: &str) -> Result<Vec<String>, EngineError> {
    let records = InputReader::parse_ndjson(ndjson)?;
    let inputs: Vec<DailyFeatures> = records.iter().map(|r| r.to_features()).collect();

    let mut engine = BmiEngine::new();
    let encoder = ResultEncoder::new();

    let outcomes = engine.process_batch(&inputs, false)?;
    outcomes
        .iter()
        .filter_map(DayOutcome::result)
        .map(|result| encoder.encode_to_json(result))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaselineStatus, FeatureId};

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(n)
    }

    fn all_features(date: NaiveDate, i: u64) -> DailyFeatures {
        let wobble = ((i * 7) % 11) as f64 / 100.0;
        DailyFeatures::new(date)
            .with(FeatureId::Vpb, 0.50 + wobble)
            .with(FeatureId::Ipb, 0.45 + wobble / 2.0)
            .with(FeatureId::Sbc, 0.60 - wobble)
            .with(FeatureId::Ipo, 0.05 + wobble / 3.0)
    }

    #[test]
    fn test_warm_up_is_degenerate_then_scores() {
        let mut engine = BmiEngine::new();
        // Days 0-1: no z-scores; days 2-3: under two prior composites
        for i in 0..4 {
            let err = engine.process(&all_features(day(i), i), false).unwrap_err();
            assert!(err.is_degenerate());
        }
        let result = engine.process(&all_features(day(4), 4), false).unwrap();
        assert_eq!(result.status, BaselineStatus::Insufficient);
        assert!((0.0..=100.0).contains(&result.aurora_score));
        assert_eq!(engine.composite_history().len(), 3);
    }

    #[test]
    fn test_status_progression() {
        let mut engine = BmiEngine::new();
        let mut statuses = Vec::new();
        for i in 0..30 {
            if let Ok(result) = engine.process(&all_features(day(i), i), false) {
                statuses.push((i, result.status));
            }
        }
        assert!(statuses.iter().any(|(_, s)| *s == BaselineStatus::Insufficient));
        let complete_from = statuses
            .iter()
            .find(|(_, s)| *s == BaselineStatus::Complete)
            .map(|(i, _)| *i);
        assert_eq!(complete_from, Some(21));
    }

    #[test]
    fn test_all_absent_is_degenerate_and_distinct() {
        let mut engine = BmiEngine::new();
        for i in 0..10 {
            let _ = engine.process(&all_features(day(i), i), false);
        }
        let err = engine.process(&DailyFeatures::new(day(10)), false).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Degenerate {
                reason: DegenerateReason::NoFeaturesPresent,
                ..
            }
        ));
    }

    #[test]
    fn test_out_of_order_leaves_state_untouched() {
        let mut engine = BmiEngine::new();
        for i in 0..6 {
            let _ = engine.process(&all_features(day(i), i), false);
        }
        let before = engine.to_json().unwrap();
        let err = engine.process(&all_features(day(3), 3), false).unwrap_err();
        assert!(err.is_consistency_violation());
        assert_eq!(engine.to_json().unwrap(), before);
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut engine = BmiEngine::new();
        let input = DailyFeatures::new(day(0)).with(FeatureId::Vpb, f64::INFINITY);
        assert!(matches!(
            engine.process(&input, false),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(engine.last_date().is_none());
    }

    #[test]
    fn test_batch_sorts_and_continues_past_degenerate_days() {
        let mut inputs: Vec<DailyFeatures> = (0..8).map(|i| all_features(day(i), i)).collect();
        inputs.reverse();

        let mut engine = BmiEngine::new();
        let outcomes = engine.process_batch(&inputs, false).unwrap();
        assert_eq!(outcomes.len(), 8);
        assert_eq!(outcomes[0].date, day(0));
        assert_eq!(outcomes.iter().filter(|o| o.result().is_some()).count(), 4);
    }

    #[test]
    fn test_restore_rejects_mismatched_windows() {
        let mut state = BmiEngine::new().export_state();
        state.baselines = BaselineStore::new(10);
        assert!(matches!(
            BmiEngine::restore(state),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_restore_rejects_stale_last_date() {
        let mut engine = BmiEngine::new();
        for i in 0..5 {
            let _ = engine.process(&all_features(day(i), i), false);
        }

        let mut state = engine.export_state();
        state.last_date = Some(day(2));
        assert!(matches!(
            BmiEngine::restore(state.clone()),
            Err(EngineError::InvalidConfig(_))
        ));

        state.last_date = None;
        assert!(BmiEngine::restore(state).is_err());
        assert!(BmiEngine::restore(engine.export_state()).is_ok());
    }

    #[test]
    fn test_score_ndjson() {
        let lines: Vec<String> = (0..6)
            .map(|i| serde_json::to_string(&all_features(day(i), i)).unwrap())
            .collect();
        let envelopes = score_ndjson(&lines.join("\n")).unwrap();
        assert_eq!(envelopes.len(), 2);
        assert!(envelopes[0].contains("\"producer\""));
    }
}
