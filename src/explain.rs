//! Explanation ranking and narrative
//!
//! Orders weighted contributions by absolute impact and renders a short
//! human-readable account of a day's result.

use crate::band::Band;
use crate::config::EngineConfig;
use crate::types::{BaselineStatus, Direction, FeatureContribution, FeatureId};
use std::cmp::Ordering;

/// Order contributions by descending |weight * z|, ties by feature priority
pub fn rank_contributions(mut contributions: Vec<FeatureContribution>) -> Vec<FeatureContribution> {
    contributions.sort_by(compare_impact);
    contributions
}

fn compare_impact(a: &FeatureContribution, b: &FeatureContribution) -> Ordering {
    b.contribution
        .abs()
        .total_cmp(&a.contribution.abs())
        .then_with(|| a.feature.priority().cmp(&b.feature.priority()))
}

/// Inputs for the narrative of one result
#[derive(Debug, Clone, Copy)]
pub struct NarrativeContext<'a> {
    pub band: Band,
    pub status: BaselineStatus,
    /// Contributions already ranked
    pub ranked: &'a [FeatureContribution],
    pub excluded: &'a [FeatureId],
    pub vpb_ipb_divergence: Option<f64>,
}

/// Build the multi-line narrative for a result
pub fn narrative(ctx: &NarrativeContext<'_>, config: &EngineConfig) -> String {
    let mut lines = vec![format!("{}: {}.", ctx.band, headline(ctx.band))];

    let drivers: Vec<String> = ctx
        .ranked
        .iter()
        .take(config.top_drivers())
        .map(describe_driver)
        .collect();
    if !drivers.is_empty() {
        lines.push(format!("Drivers: {}.", drivers.join("; ")));
    }

    if let Some(note) = divergence_note(ctx.vpb_ipb_divergence, config.divergence_warn()) {
        lines.push(note.to_string());
    }

    match ctx.status {
        BaselineStatus::Complete => {}
        BaselineStatus::Partial => {
            lines.push("Some features have less than a full month of baseline history.".to_string())
        }
        BaselineStatus::Insufficient => lines
            .push("No feature has enough baseline history; treat this reading as provisional.".to_string()),
    }

    if !ctx.excluded.is_empty() {
        let names: Vec<&str> = ctx.excluded.iter().map(FeatureId::as_str).collect();
        lines.push(format!("Excluded: {}.", names.join(", ")));
    }

    lines.join("\n")
}

fn headline(band: Band) -> &'static str {
    match band {
        Band::Green => "participation is broad and healthy",
        Band::LightGreen => "participation is moderate",
        Band::Yellow => "participation is narrowing",
        Band::Red => "participation is weak and concentrated",
    }
}

fn describe_driver(c: &FeatureContribution) -> String {
    let subject = match c.feature {
        FeatureId::Vpb => "volume participation",
        FeatureId::Ipb => "issue participation",
        FeatureId::Sbc => "structural breadth",
        FeatureId::Ipo => "institutional participation",
    };
    let arrow = match c.direction {
        Direction::Elevated => "up",
        Direction::Depressed => "down",
        Direction::Neutral => "flat",
    };
    format!(
        "{subject} {} ({} {:+.1} sd, {arrow})",
        c.direction.as_str(),
        c.feature,
        c.z_value
    )
}

/// Note on VPB/IPB disagreement, if it exceeds `threshold`
pub fn divergence_note(divergence: Option<f64>, threshold: f64) -> Option<&'static str> {
    let d = divergence?;
    if d > threshold {
        Some("Volume breadth leads issue breadth: leadership is narrow and concentrated in heavy names.")
    } else if d < -threshold {
        Some("Issue breadth leads volume breadth: participation is wide but light.")
    } else {
        None
    }
}
