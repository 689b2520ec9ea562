use aurora_bmi::store::{JsonFileStore, MemoryStore, StateStore};
use aurora_bmi::{BmiEngine, DailyFeatures, EngineError, FeatureId};
use chrono::{Days, NaiveDate};
use pretty_assertions::assert_eq;
use std::fs;

fn day(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 6, 1).unwrap() + Days::new(n)
}

fn synthetic(n: u64) -> DailyFeatures {
    let t = n as f64;
    let mut input = DailyFeatures::new(day(n))
        .with(FeatureId::Vpb, 0.5 + 0.1 * (t * 0.8).sin())
        .with(FeatureId::Ipb, 0.5 + 0.07 * (t * 0.5).cos())
        .with(FeatureId::Sbc, 0.6 + 0.03 * (t * 0.2).sin());
    // IPO drops out every fifth day
    if n % 5 != 0 {
        input = input.with(FeatureId::Ipo, 0.1 + 0.02 * (t * 1.7).sin());
    }
    input
}

/// Process days and publish results, as a daily job would
fn run_days(engine: &mut BmiEngine, store: &mut dyn StateStore, days: std::ops::Range<u64>) {
    for n in days {
        if let Ok(result) = engine.process(&synthetic(n), false) {
            store.append_result(&result).unwrap();
        }
    }
    store.save_state(&engine.export_state()).unwrap();
}

#[test]
fn test_resumed_engine_matches_uninterrupted_run() {
    let dir = tempfile::tempdir().unwrap();

    let mut uninterrupted = BmiEngine::new();
    let mut reference = MemoryStore::new();
    run_days(&mut uninterrupted, &mut reference, 0..90);

    let mut store = JsonFileStore::open(dir.path()).unwrap();
    let mut first = BmiEngine::new();
    run_days(&mut first, &mut store, 0..45);

    let state = store.load_state().unwrap().unwrap();
    let mut resumed = BmiEngine::restore(state).unwrap();
    assert_eq!(resumed.last_date(), Some(day(44)));
    run_days(&mut resumed, &mut store, 45..90);

    let stored = store.load_results().unwrap();
    let expected = reference.load_results().unwrap();
    assert_eq!(stored.len(), expected.len());
    for (a, b) in stored.iter().zip(&expected) {
        assert_eq!(a.date, b.date);
        assert_eq!(a.band, b.band);
        assert_eq!(a.status, b.status);
        assert_eq!(a.excluded_features, b.excluded_features);
        assert!((a.composite_value - b.composite_value).abs() < 1e-9);
        assert!((a.aurora_score - b.aurora_score).abs() < 1e-9);
    }

    assert_eq!(resumed.last_date(), uninterrupted.last_date());
    assert_eq!(
        resumed.composite_history().len(),
        uninterrupted.composite_history().len()
    );
}

#[test]
fn test_state_write_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonFileStore::open(dir.path().join("nested")).unwrap();
    let mut engine = BmiEngine::new();
    run_days(&mut engine, &mut store, 0..10);

    assert!(store.state_path().exists());
    assert!(store.results_path().exists());
    let names: Vec<String> = fs::read_dir(dir.path().join("nested"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
}

#[test]
fn test_first_run_has_no_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path()).unwrap();
    assert!(store.load_state().unwrap().is_none());
    assert!(store.load_results().unwrap().is_empty());
}

#[test]
fn test_corrupt_state_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path()).unwrap();
    fs::write(store.state_path(), "{\"config\": 42}").unwrap();
    assert!(matches!(store.load_state(), Err(EngineError::ParseError(_))));
}

#[test]
fn test_persisted_statistics_are_rebuilt() {
    let mut engine = BmiEngine::new();
    for n in 0..70 {
        let _ = engine.process(&synthetic(n), false);
    }
    let json = engine.to_json().unwrap();

    // Stored form carries entries only
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let vpb = &value["baselines"]["windows"]["VPB"];
    assert_eq!(vpb["entries"].as_array().unwrap().len(), 63);
    assert!(vpb.get("stats").is_none());

    let restored = BmiEngine::from_json(&json).unwrap();
    for feature in FeatureId::ALL {
        let a = engine.baselines().baseline(feature);
        let b = restored.baselines().baseline(feature);
        assert_eq!(a.n, b.n);
        assert!((a.mean.unwrap() - b.mean.unwrap()).abs() < 1e-12);
        assert!((a.std_dev.unwrap() - b.std_dev.unwrap()).abs() < 1e-12);
    }
}

#[test]
fn test_tampered_constants_rejected_on_restore() {
    let json = BmiEngine::new()
        .to_json()
        .unwrap()
        .replace("\"VPB\":0.3", "\"VPB\":0.5");
    assert!(matches!(
        BmiEngine::from_json(&json),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn test_feature_window_capacity_checked_on_restore() {
    let mut engine = BmiEngine::new();
    for n in 0..4 {
        let _ = engine.process(&synthetic(n), false);
    }
    let mut value: serde_json::Value = serde_json::from_str(&engine.to_json().unwrap()).unwrap();
    value["baselines"]["windows"]["VPB"]["capacity"] = serde_json::json!(5);

    let err = BmiEngine::from_json(&value.to_string()).unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig(_)));
    assert!(err.to_string().contains("VPB"));
}

#[test]
fn test_missing_feature_window_rejected_on_restore() {
    let mut value: serde_json::Value =
        serde_json::from_str(&BmiEngine::new().to_json().unwrap()).unwrap();
    value["baselines"]["windows"]
        .as_object_mut()
        .unwrap()
        .remove("IPO");

    assert!(matches!(
        BmiEngine::from_json(&value.to_string()),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn test_stale_last_date_rejected_on_restore() {
    let mut engine = BmiEngine::new();
    for n in 0..10 {
        let _ = engine.process(&synthetic(n), false);
    }
    let mut value: serde_json::Value = serde_json::from_str(&engine.to_json().unwrap()).unwrap();
    value["last_date"] = serde_json::json!(day(6).to_string());

    assert!(matches!(
        BmiEngine::from_json(&value.to_string()),
        Err(EngineError::InvalidConfig(_))
    ));
}
