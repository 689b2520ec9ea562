//! Composite scoring
//!
//! Combines the day's standardized features into one weight-renormalized
//! composite. Absent features are dropped from both the numerator and the
//! denominator; they are never counted as zero.

use crate::explain::rank_contributions;
use crate::types::{
    BaselineStatus, CompositeScoreRecord, Direction, FeatureContribution, FeatureId,
    StandardizedFeature,
};
use chrono::NaiveDate;

/// Composite scorer over standardized features
pub struct CompositeScorer;

impl CompositeScorer {
    /// Weighted contributions of every feature with a defined z-score
    pub fn contributions(features: &[StandardizedFeature]) -> Vec<FeatureContribution> {
        features
            .iter()
            .filter_map(|f| {
                let z = f.z_value?;
                Some(FeatureContribution {
                    feature: f.feature,
                    raw_value: f.raw_value?,
                    z_value: z,
                    weight: f.weight,
                    contribution: f.weight * z,
                    direction: Direction::from_z(z),
                })
            })
            .collect()
    }

    /// sum(w_i * z_i) / sum(w_i) over present features, `None` if there are none
    pub fn composite(contributions: &[FeatureContribution]) -> Option<f64> {
        if contributions.is_empty() {
            return None;
        }
        let weighted: f64 = contributions.iter().map(|c| c.contribution).sum();
        let total_weight: f64 = contributions.iter().map(|c| c.weight).sum();
        (total_weight > 0.0).then(|| weighted / total_weight)
    }

    /// Score one date
    pub fn score(
        date: NaiveDate,
        features: &[StandardizedFeature],
        status: BaselineStatus,
    ) -> CompositeScoreRecord {
        let contributions = Self::contributions(features);
        let composite_value = Self::composite(&contributions);
        CompositeScoreRecord {
            date,
            composite_value,
            contributing_features: rank_contributions(contributions),
            status,
        }
    }

    /// z_VPB - z_IPB, when both are defined
    pub fn vpb_ipb_divergence(features: &[StandardizedFeature]) -> Option<f64> {
        let z = |id: FeatureId| features.iter().find(|f| f.feature == id)?.z_value;
        Some(z(FeatureId::Vpb)? - z(FeatureId::Ipb)?)
    }

    /// Features with no defined z-score, in priority order
    pub fn excluded(features: &[StandardizedFeature]) -> Vec<FeatureId> {
        FeatureId::ALL
            .into_iter()
            .filter(|id| {
                !features
                    .iter()
                    .any(|f| f.feature == *id && f.z_value.is_some())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WEIGHTS;

    fn standardized(feature: FeatureId, z: Option<f64>) -> StandardizedFeature {
        StandardizedFeature {
            feature,
            z_value: z,
            weight: WEIGHTS.get(feature),
            raw_value: z.map(|_| 0.5),
            n: 30,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    #[test]
    fn test_all_present_composite() {
        let features = [
            standardized(FeatureId::Vpb, Some(1.0)),
            standardized(FeatureId::Ipb, Some(0.5)),
            standardized(FeatureId::Sbc, Some(-0.5)),
            standardized(FeatureId::Ipo, Some(2.0)),
        ];
        let record = CompositeScorer::score(date(), &features, BaselineStatus::Complete);
        assert!((record.composite_value.unwrap() - 0.70).abs() < 1e-12);
        assert_eq!(record.contributing_features.len(), 4);
        assert_eq!(record.contributing_features[0].feature, FeatureId::Ipo);
    }

    #[test]
    fn test_absent_feature_renormalizes() {
        let features = [
            standardized(FeatureId::Vpb, Some(1.0)),
            standardized(FeatureId::Ipb, Some(0.5)),
            standardized(FeatureId::Sbc, Some(-0.5)),
            standardized(FeatureId::Ipo, None),
        ];
        let record = CompositeScorer::score(date(), &features, BaselineStatus::Partial);
        assert!((record.composite_value.unwrap() - 0.375).abs() < 1e-12);
        assert_eq!(CompositeScorer::excluded(&features), vec![FeatureId::Ipo]);
    }

    #[test]
    fn test_absent_differs_from_zero() {
        let absent = [
            standardized(FeatureId::Vpb, Some(1.0)),
            standardized(FeatureId::Ipb, None),
        ];
        let zero = [
            standardized(FeatureId::Vpb, Some(1.0)),
            standardized(FeatureId::Ipb, Some(0.0)),
        ];
        let a = CompositeScorer::composite(&CompositeScorer::contributions(&absent)).unwrap();
        let z = CompositeScorer::composite(&CompositeScorer::contributions(&zero)).unwrap();
        assert!((a - 1.0).abs() < 1e-12);
        assert!((z - 0.30 / 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_no_present_features() {
        let features: Vec<_> = FeatureId::ALL
            .into_iter()
            .map(|f| standardized(f, None))
            .collect();
        let record = CompositeScorer::score(date(), &features, BaselineStatus::Insufficient);
        assert!(record.composite_value.is_none());
        assert!(record.contributing_features.is_empty());
        assert_eq!(CompositeScorer::excluded(&features).len(), 4);
    }

    #[test]
    fn test_extreme_z_passes_through() {
        let features = [standardized(FeatureId::Vpb, Some(100.0))];
        let record = CompositeScorer::score(date(), &features, BaselineStatus::Complete);
        assert!((record.composite_value.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_divergence() {
        let features = [
            standardized(FeatureId::Vpb, Some(1.5)),
            standardized(FeatureId::Ipb, Some(-0.25)),
        ];
        assert!((CompositeScorer::vpb_ipb_divergence(&features).unwrap() - 1.75).abs() < 1e-12);

        let missing = [standardized(FeatureId::Vpb, Some(1.5))];
        assert!(CompositeScorer::vpb_ipb_divergence(&missing).is_none());
    }
}
