//! Aggregate quality scoring for a consolidated report.
//!
//! Weighting:
//! - presence of every required-for-report section: 40 points, proportional
//! - insight count against `min_insights`: 25 points, proportional, capped
//! - avatar depth: 20 points, scaled from [`avatar_depth_score`]
//! - source count against `min_sources`: 15 points, pass/fail

use serde_json::Value;

use reportforge_shared::{ConsolidatedReport, QualityConfig, QualityReport, StageName};

const PRESENCE_WEIGHT: f64 = 40.0;
const INSIGHT_WEIGHT: f64 = 25.0;
const AVATAR_WEIGHT: f64 = 20.0;
const SOURCE_WEIGHT: f64 = 15.0;

/// Depth of an avatar section on a 0..=100 scale.
///
/// Starts at 100 and deducts for thin demographics (<4 fields, -20), few
/// pain points (<5, -25), few desires (<5, -25), few objections (<3, -20),
/// and any short leading pain point (<30 chars among the first 3, -10).
pub fn avatar_depth_score(avatar: &Value) -> u32 {
    let mut score: i32 = 100;

    let demographic_fields = avatar
        .get("demographicProfile")
        .and_then(Value::as_object)
        .map(|m| m.len())
        .unwrap_or(0);
    if demographic_fields < 4 {
        score -= 20;
    }

    let pains = list(avatar, "painPoints");
    if pains.len() < 5 {
        score -= 25;
    }
    if list(avatar, "desires").len() < 5 {
        score -= 25;
    }
    if list(avatar, "objections").len() < 3 {
        score -= 20;
    }

    let short_pain = pains.iter().take(3).any(|p| {
        p.as_str()
            .or_else(|| p.get("description").and_then(Value::as_str))
            .is_none_or(|text| text.chars().count() < 30)
    });
    if short_pain {
        score -= 10;
    }

    score.max(0) as u32
}

/// Score `report` against the `[quality]` thresholds.
pub fn score_final_analysis(report: &ConsolidatedReport, config: &QualityConfig) -> QualityReport {
    let mut issues = Vec::new();

    // Presence
    let required = StageName::REQUIRED_FOR_REPORT;
    let missing: Vec<&str> = required
        .iter()
        .filter(|stage| !report.has_section(**stage))
        .map(|stage| stage.as_str())
        .collect();
    let present = required.len() - missing.len();
    let mut score = PRESENCE_WEIGHT * present as f64 / required.len() as f64;
    if !missing.is_empty() {
        issues.push(format!("Missing required sections: {}", missing.join(", ")));
    }

    // Insights
    let insight_count = report
        .section(StageName::Insights)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    let target = config.min_insights.max(1);
    score += INSIGHT_WEIGHT * (insight_count as f64 / target as f64).min(1.0);
    if insight_count < config.min_insights {
        issues.push(format!(
            "Insufficient insights: {insight_count} of {} required",
            config.min_insights
        ));
    }

    // Avatar depth
    match report.section(StageName::Avatar) {
        Some(avatar) => {
            let depth = avatar_depth_score(avatar);
            score += AVATAR_WEIGHT * f64::from(depth) / 100.0;
            if depth < 100 {
                issues.push(format!("Avatar depth below target: {depth}/100"));
            }
        }
        None => issues.push("Avatar section missing".into()),
    }

    // Sources
    let sources = source_count(report);
    if sources >= config.min_sources {
        score += SOURCE_WEIGHT;
    } else {
        issues.push(format!(
            "Insufficient sources: {sources} of {} required",
            config.min_sources
        ));
    }

    let score = (score * 10.0).round() / 10.0;
    QualityReport {
        score,
        meets_minimum: score >= config.min_quality_score,
        issues,
    }
}

/// Number of sources the web-search section reports.
pub fn source_count(report: &ConsolidatedReport) -> usize {
    report
        .section(StageName::WebSearch)
        .and_then(|ws| ws.get("totalSources"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}

fn list<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
