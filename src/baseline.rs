//! Baseline management
//!
//! This module manages per-feature rolling baselines. Each feature owns an
//! independent window of its most recent present observations with mean and
//! variance maintained incrementally (Welford), so the per-day cost does not
//! depend on the window length.
//!
//! The baseline returned for a date is always taken from the window's state
//! *before* that date's own value is appended.

use crate::config::ROLLING_WINDOW;
use crate::error::EngineError;
use crate::types::{Baseline, FeatureId, FeatureObservation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default baseline window in trading days
pub const DEFAULT_BASELINE_WINDOW: usize = ROLLING_WINDOW;

/// Variance below this fraction of mean² is treated as zero
const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;

/// Running mean and sum of squared deviations supporting removal
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RunningStats {
    n: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn add(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn remove(&mut self, x: f64) {
        if self.n <= 1 {
            *self = Self::default();
            return;
        }
        let old_mean = self.mean;
        self.n -= 1;
        self.mean = old_mean - (x - old_mean) / self.n as f64;
        self.m2 -= (x - old_mean) * (x - self.mean);
        if self.m2 < 0.0 {
            self.m2 = 0.0;
        }
    }

    fn baseline(&self) -> Baseline {
        if self.n == 0 {
            return Baseline::default();
        }
        let std_dev = if self.n >= 2 {
            let variance = self.m2 / (self.n - 1) as f64;
            let scale = self.mean.abs().max(1.0);
            (variance > ZERO_VARIANCE_TOLERANCE * scale * scale).then(|| variance.sqrt())
        } else {
            None
        };
        Baseline {
            mean: Some(self.mean),
            std_dev,
            n: self.n,
        }
    }
}

/// One present observation held in a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub date: NaiveDate,
    pub value: f64,
}

/// Outcome of applying one date to a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowUpdate {
    /// A new date was applied
    Applied(Baseline),
    /// The date was already applied; nothing changed
    Unchanged(Baseline),
    /// The date was already applied and was overwritten (`force`)
    Reapplied(Baseline),
}

impl WindowUpdate {
    /// The baseline that precedes the applied date
    pub fn baseline(&self) -> Baseline {
        match self {
            WindowUpdate::Applied(b) | WindowUpdate::Unchanged(b) | WindowUpdate::Reapplied(b) => *b,
        }
    }
}

/// Bounded FIFO of present observations with incrementally maintained stats.
///
/// Dates are applied in strictly increasing order. The most recent date may
/// be re-applied: without `force` it is a no-op, with `force` its slot is
/// overwritten (restoring anything that slot evicted).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PersistedWindow", into = "PersistedWindow")]
pub struct RollingWindow {
    entries: VecDeque<WindowEntry>,
    capacity: usize,
    stats: RunningStats,
    /// Last date applied, whether or not it carried a value
    last_date: Option<NaiveDate>,
    /// Baseline returned for `last_date`
    last_baseline: Baseline,
    /// Entry evicted by the update for `last_date`
    last_evicted: Option<WindowEntry>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
            stats: RunningStats::default(),
            last_date: None,
            last_baseline: Baseline::default(),
            last_evicted: None,
        }
    }

    /// Current statistics over every entry in the window
    pub fn baseline(&self) -> Baseline {
        self.stats.baseline()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|e| e.value)
    }

    /// Values strictly older than `date`
    pub fn values_before(&self, date: NaiveDate) -> Vec<f64> {
        self.entries
            .iter()
            .take_while(|e| e.date < date)
            .map(|e| e.value)
            .collect()
    }

    /// Values as the window stood before `date` was applied.
    ///
    /// For the latest applied date this drops that date's own entry and puts
    /// back the entry it evicted; for a later date it is every held value.
    pub fn values_prior_to(&self, date: NaiveDate) -> Vec<f64> {
        let mut values: Vec<f64> = match self.last_date {
            Some(last) if last == date => self.last_evicted.map(|e| e.value).into_iter().collect(),
            _ => Vec::with_capacity(self.entries.len()),
        };
        values.extend(self.values_before(date));
        values
    }

    /// Reject a date older than the last applied date
    pub fn ensure_in_order(&self, series: &str, date: NaiveDate) -> Result<(), EngineError> {
        match self.last_date {
            Some(last) if date < last => Err(EngineError::OutOfOrder {
                series: series.to_string(),
                date,
                last,
            }),
            _ => Ok(()),
        }
    }

    /// Apply one date's value and return the baseline that precedes it
    pub fn observe(
        &mut self,
        series: &str,
        date: NaiveDate,
        value: Option<f64>,
        force: bool,
    ) -> Result<WindowUpdate, EngineError> {
        self.ensure_in_order(series, date)?;

        if self.last_date == Some(date) {
            if !force {
                return Ok(WindowUpdate::Unchanged(self.last_baseline));
            }
            self.rollback_last();
            self.push(date, value);
            return Ok(WindowUpdate::Reapplied(self.last_baseline));
        }

        let baseline = self.stats.baseline();
        self.last_evicted = None;
        self.push(date, value);
        self.last_date = Some(date);
        self.last_baseline = baseline;
        Ok(WindowUpdate::Applied(baseline))
    }

    fn push(&mut self, date: NaiveDate, value: Option<f64>) {
        let Some(value) = value else {
            return;
        };
        self.entries.push_back(WindowEntry { date, value });
        self.stats.add(value);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.stats.remove(evicted.value);
                self.last_evicted = Some(evicted);
            }
        }
    }

    /// Undo the value pushed for `last_date`, if any
    fn rollback_last(&mut self) {
        let pushed_last = matches!(
            (self.entries.back(), self.last_date),
            (Some(entry), Some(last)) if entry.date == last
        );
        if pushed_last {
            if let Some(entry) = self.entries.pop_back() {
                self.stats.remove(entry.value);
            }
        }
        if let Some(evicted) = self.last_evicted.take() {
            self.entries.push_front(evicted);
            self.stats.add(evicted.value);
        }
    }

    /// Statistics of the window as it stood before `last_date` was applied
    fn prior_baseline(&self) -> Baseline {
        let mut stats = self.stats;
        if let (Some(entry), Some(last)) = (self.entries.back(), self.last_date) {
            if entry.date == last {
                stats.remove(entry.value);
            }
        }
        if let Some(evicted) = self.last_evicted {
            stats.add(evicted.value);
        }
        stats.baseline()
    }
}

/// On-disk form of a window: entries only, statistics are rebuilt on load
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedWindow {
    capacity: usize,
    entries: Vec<WindowEntry>,
    #[serde(default)]
    last_date: Option<NaiveDate>,
    #[serde(default)]
    last_evicted: Option<WindowEntry>,
}

impl From<RollingWindow> for PersistedWindow {
    fn from(window: RollingWindow) -> Self {
        Self {
            capacity: window.capacity,
            entries: window.entries.into_iter().collect(),
            last_date: window.last_date,
            last_evicted: window.last_evicted,
        }
    }
}

impl TryFrom<PersistedWindow> for RollingWindow {
    type Error = String;

    fn try_from(persisted: PersistedWindow) -> Result<Self, Self::Error> {
        if persisted.capacity == 0 {
            return Err("window capacity must be positive".to_string());
        }
        if persisted.entries.len() > persisted.capacity {
            return Err(format!(
                "window holds {} entries, capacity is {}",
                persisted.entries.len(),
                persisted.capacity
            ));
        }
        if persisted.entries.windows(2).any(|w| w[0].date >= w[1].date) {
            return Err("window entries are not in strictly increasing date order".to_string());
        }
        if let (Some(entry), Some(last)) = (persisted.entries.last(), persisted.last_date) {
            if entry.date > last {
                return Err(format!("entry {} is newer than last date {last}", entry.date));
            }
        }

        let mut window = RollingWindow::new(persisted.capacity);
        for entry in persisted.entries {
            if !entry.value.is_finite() {
                return Err(format!("non-finite value on {}", entry.date));
            }
            window.stats.add(entry.value);
            window.entries.push_back(entry);
        }
        window.last_date = persisted.last_date;
        window.last_evicted = persisted.last_evicted;
        window.last_baseline = window.prior_baseline();
        Ok(window)
    }
}

/// Owner of every feature's rolling window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineStore {
    windows: BTreeMap<FeatureId, RollingWindow>,
    window_size: usize,
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE_WINDOW)
    }
}

impl BaselineStore {
    /// Create a new baseline store with specified window size
    pub fn new(window_size: usize) -> Self {
        let windows = FeatureId::ALL
            .into_iter()
            .map(|f| (f, RollingWindow::new(window_size)))
            .collect();
        Self {
            windows,
            window_size,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Compute the feature's baseline from its prior window, then append the
    /// observation (if present).
    ///
    /// A repeated date is a no-op returning the baseline first returned for
    /// it, unless `force` is set, in which case the day's slot is replaced.
    pub fn update_and_get_baseline(
        &mut self,
        feature: FeatureId,
        date: NaiveDate,
        raw_value: Option<f64>,
        force: bool,
    ) -> Result<Baseline, EngineError> {
        let window_size = self.window_size;
        let window = self
            .windows
            .entry(feature)
            .or_insert_with(|| RollingWindow::new(window_size));

        let update = window.observe(feature.as_str(), date, raw_value, force)?;
        match update {
            WindowUpdate::Applied(_) => {}
            WindowUpdate::Unchanged(_) => {
                tracing::debug!(feature = %feature, %date, "date already applied, window unchanged");
            }
            WindowUpdate::Reapplied(_) => {
                tracing::warn!(feature = %feature, %date, "forced re-application of an applied date");
            }
        }
        Ok(update.baseline())
    }

    /// Apply a recorded observation
    pub fn apply(
        &mut self,
        observation: &FeatureObservation,
        force: bool,
    ) -> Result<Baseline, EngineError> {
        self.update_and_get_baseline(
            observation.feature,
            observation.date,
            observation.raw_value,
            force,
        )
    }

    /// Fail if any feature has already moved past `date`
    pub fn ensure_in_order(&self, date: NaiveDate) -> Result<(), EngineError> {
        self.windows
            .iter()
            .try_for_each(|(feature, window)| window.ensure_in_order(feature.as_str(), date))
    }

    pub fn window(&self, feature: FeatureId) -> Option<&RollingWindow> {
        self.windows.get(&feature)
    }

    /// Current statistics for a feature, including its latest value
    pub fn baseline(&self, feature: FeatureId) -> Baseline {
        self.windows
            .get(&feature)
            .map(RollingWindow::baseline)
            .unwrap_or_default()
    }

    /// Number of present observations held for a feature
    pub fn observation_count(&self, feature: FeatureId) -> usize {
        self.windows.get(&feature).map_or(0, RollingWindow::len)
    }

    /// Clear all baseline data
    pub fn clear(&mut self) {
        *self = Self::new(self.window_size);
    }

    /// Load baseline store from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize baseline store to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
