use aurora_bmi::baseline::BaselineStore;
use aurora_bmi::percentile::CompositeHistory;
use aurora_bmi::{
    Band, BaselineStatus, BmiEngine, DailyFeatures, DegenerateReason, EngineConfig, EngineError,
    EngineState, FeatureId,
};
use chrono::{Days, NaiveDate};
use pretty_assertions::assert_eq;

fn day(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + Days::new(n)
}

/// Deterministic breadth-like series without an RNG dependency
fn synthetic(n: u64) -> DailyFeatures {
    let phase = n as f64;
    DailyFeatures::new(day(n))
        .with(FeatureId::Vpb, 0.52 + 0.08 * (phase * 0.9).sin())
        .with(FeatureId::Ipb, 0.50 + 0.06 * (phase * 0.7 + 1.0).sin())
        .with(FeatureId::Sbc, 0.55 + 0.04 * (phase * 0.3).cos())
        .with(FeatureId::Ipo, 0.08 + 0.03 * (phase * 1.3).sin())
}

const HISTORY_DAYS: u64 = 30;

/// Sample standard deviation of 30 values alternating 0.4 / 0.6
fn alternating_std() -> f64 {
    let n = HISTORY_DAYS as f64;
    (n * 0.01 / (n - 1.0)).sqrt()
}

/// Engine whose feature baselines all have mean 0.5 and whose composite
/// history puts 0.70 at the 80th percentile
fn engine_with_known_history() -> BmiEngine {
    let config = EngineConfig::aurora();
    let mut baselines = BaselineStore::new(config.window());
    for feature in FeatureId::ALL {
        for i in 0..HISTORY_DAYS {
            let value = if i % 2 == 0 { 0.4 } else { 0.6 };
            baselines
                .update_and_get_baseline(feature, day(i), Some(value), false)
                .unwrap();
        }
    }

    let mut composites = CompositeHistory::new(config.window());
    let prior = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.65, 0.68, 0.9, 1.2];
    for (i, value) in prior.iter().enumerate() {
        composites
            .record(day(HISTORY_DAYS - 10 + i as u64), Some(*value), false)
            .unwrap();
    }

    BmiEngine::restore(EngineState {
        config,
        baselines,
        composites,
        last_date: Some(day(HISTORY_DAYS - 1)),
    })
    .unwrap()
}

fn value_for_z(z: f64) -> f64 {
    0.5 + z * alternating_std()
}

#[test]
fn test_four_present_features_score_green() {
    let mut engine = engine_with_known_history();
    let input = DailyFeatures::new(day(HISTORY_DAYS))
        .with(FeatureId::Vpb, value_for_z(1.0))
        .with(FeatureId::Ipb, value_for_z(0.5))
        .with(FeatureId::Sbc, value_for_z(-0.5))
        .with(FeatureId::Ipo, value_for_z(2.0));

    let result = engine.process(&input, false).unwrap();

    assert!((result.composite_value - 0.70).abs() < 1e-9);
    assert!((result.percentile_rank - 80.0).abs() < 1e-9);
    assert!((result.aurora_score - 20.0).abs() < 1e-9);
    assert_eq!(result.band, Band::Green);
    assert_eq!(result.status, BaselineStatus::Complete);
    assert!(result.excluded_features.is_empty());

    let order: Vec<FeatureId> = result.explanation.iter().map(|c| c.feature).collect();
    assert_eq!(&order[..2], &[FeatureId::Ipo, FeatureId::Vpb]);
    assert!((result.explanation[0].contribution - 0.40).abs() < 1e-9);
}

#[test]
fn test_missing_feature_renormalizes_and_degrades_status() {
    let mut engine = engine_with_known_history();
    let input = DailyFeatures::new(day(HISTORY_DAYS))
        .with(FeatureId::Vpb, value_for_z(1.0))
        .with(FeatureId::Ipb, value_for_z(0.5))
        .with(FeatureId::Sbc, value_for_z(-0.5))
        .without(FeatureId::Ipo);

    let result = engine.process(&input, false).unwrap();

    assert!((result.composite_value - 0.375).abs() < 1e-9);
    assert_eq!(result.status, BaselineStatus::Partial);
    assert_eq!(result.excluded_features, vec![FeatureId::Ipo]);
    assert_eq!(result.explanation.len(), 3);
    assert!(result.narrative.contains("Excluded: IPO."));
}

#[test]
fn test_extreme_value_is_not_clipped() {
    let mut engine = engine_with_known_history();
    let input = DailyFeatures::new(day(HISTORY_DAYS)).with(FeatureId::Vpb, value_for_z(100.0));

    let result = engine.process(&input, false).unwrap();

    let vpb = &result.explanation[0];
    assert!((vpb.z_value - 100.0).abs() < 1e-6);
    assert!((result.composite_value - 100.0).abs() < 1e-6);
    // Bounded only by the percentile step
    assert_eq!(result.aurora_score, 0.0);
    assert_eq!(result.band, Band::Green);
}

#[test]
fn test_all_absent_is_degenerate_not_insufficient() {
    let mut engine = BmiEngine::new();
    let mut insufficient = None;
    for i in 0..6 {
        if let Ok(result) = engine.process(&synthetic(i), false) {
            insufficient.get_or_insert(result);
        }
    }

    // A number was produced while every baseline is short
    let insufficient = insufficient.unwrap();
    assert_eq!(insufficient.status, BaselineStatus::Insufficient);
    assert!((0.0..=100.0).contains(&insufficient.aurora_score));

    // No number at all
    let err = engine.process(&DailyFeatures::new(day(6)), false).unwrap_err();
    assert!(err.is_degenerate());
    assert!(matches!(
        err,
        EngineError::Degenerate {
            reason: DegenerateReason::NoFeaturesPresent,
            ..
        }
    ));
}

#[test]
fn test_rerun_same_date_is_idempotent() {
    let mut engine = BmiEngine::new();
    for i in 0..40 {
        let _ = engine.process(&synthetic(i), false);
    }

    let first = engine.process(&synthetic(40), false).unwrap();
    let lengths: Vec<usize> = FeatureId::ALL
        .iter()
        .map(|f| engine.baselines().observation_count(*f))
        .collect();
    let composites = engine.composite_history().len();

    let second = engine.process(&synthetic(40), false).unwrap();

    assert_eq!(first, second);
    let lengths_after: Vec<usize> = FeatureId::ALL
        .iter()
        .map(|f| engine.baselines().observation_count(*f))
        .collect();
    assert_eq!(lengths, lengths_after);
    assert_eq!(composites, engine.composite_history().len());
}

#[test]
fn test_force_replaces_day_without_double_counting() {
    let mut engine = BmiEngine::new();
    for i in 0..30 {
        let _ = engine.process(&synthetic(i), false);
    }
    let original = engine.process(&synthetic(30), false).unwrap();
    let count = engine.baselines().observation_count(FeatureId::Vpb);

    let revised = synthetic(30).with(FeatureId::Vpb, 0.95);
    let forced = engine.process(&revised, true).unwrap();

    assert_eq!(engine.baselines().observation_count(FeatureId::Vpb), count);
    assert!(forced.composite_value > original.composite_value);

    // Processing continues normally after a forced day
    let next = engine.process(&synthetic(31), false).unwrap();
    assert_eq!(next.date, day(31));
}

#[test]
fn test_out_of_order_day_rejected() {
    let mut engine = BmiEngine::new();
    for i in 0..10 {
        let _ = engine.process(&synthetic(i), false);
    }
    let err = engine.process(&synthetic(3), false).unwrap_err();
    assert!(err.is_consistency_violation());
    assert!(!err.is_degenerate());
}

#[test]
fn test_windows_bounded_over_long_runs() {
    let mut engine = BmiEngine::new();
    let inputs: Vec<DailyFeatures> = (0..250).map(synthetic).collect();
    let outcomes = engine.process_batch(&inputs, false).unwrap();

    assert_eq!(outcomes.len(), 250);
    for feature in FeatureId::ALL {
        assert_eq!(engine.baselines().observation_count(feature), 63);
    }
    assert_eq!(engine.composite_history().len(), 63);

    for outcome in outcomes.iter().filter_map(|o| o.result()) {
        assert!((0.0..=100.0).contains(&outcome.aurora_score));
        assert_eq!(outcome.band, Band::classify(outcome.aurora_score));
    }
}

#[test]
fn test_percentile_ranks_against_full_window() {
    let mut engine = BmiEngine::new();
    for i in 0..120 {
        let _ = engine.process(&synthetic(i), false);
    }
    assert_eq!(engine.composite_history().len(), 63);

    let prior = engine.composite_history().prior_values(day(120));
    assert_eq!(prior.len(), 63);

    let result = engine.process(&synthetic(120), false).unwrap();
    let at_or_below = prior
        .iter()
        .filter(|v| **v <= result.composite_value)
        .count();
    let expected = at_or_below as f64 / 63.0 * 100.0;
    assert!((result.percentile_rank - expected).abs() < 1e-9);
    assert!((result.aurora_score - (100.0 - expected)).abs() < 1e-9);

    // The day's own record evicted the oldest value; ranking still sees 63
    assert_eq!(engine.composite_history().prior_values(day(120)), prior);
    let rerun = engine.process(&synthetic(120), false).unwrap();
    assert_eq!(rerun, result);
}

#[test]
fn test_status_follows_feature_history() {
    let mut engine = BmiEngine::new();
    let mut by_day = Vec::new();
    for i in 0..25 {
        if let Ok(result) = engine.process(&synthetic(i), false) {
            by_day.push((i, result.status));
        }
    }

    for (i, status) in by_day {
        let expected = if i >= 21 {
            BaselineStatus::Complete
        } else {
            BaselineStatus::Insufficient
        };
        assert_eq!(status, expected, "day {i}");
    }
}

#[test]
fn test_future_days_do_not_change_past_results() {
    let inputs: Vec<DailyFeatures> = (0..60).map(synthetic).collect();

    let mut short = BmiEngine::new();
    let short_outcomes = short.process_batch(&inputs[..40], false).unwrap();

    let mut long = BmiEngine::new();
    let long_outcomes = long.process_batch(&inputs, false).unwrap();

    for (a, b) in short_outcomes.iter().zip(&long_outcomes) {
        assert_eq!(a.result(), b.result());
    }
}
