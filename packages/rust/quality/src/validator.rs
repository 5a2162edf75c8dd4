//! Per-stage acceptance gate.
//!
//! Every stage result passes through [`StageValidator::rejections`]. An empty
//! rejection list means the value is accepted; otherwise each entry names one
//! rule the value broke, and the orchestrator records the stage as failed.

use serde_json::Value;
use tracing::debug;

use reportforge_shared::{QualityConfig, StageName};

use crate::authenticity::{is_emergency, is_empty_value, is_fallback, looks_templated};

/// Minimum pain points and desires an avatar must list.
pub const MIN_AVATAR_ITEMS: usize = 5;

/// Leading pain points that must pass the authenticity check.
pub const INSPECTED_PAIN_POINTS: usize = 3;

/// Minimum mental-driver entries.
pub const MIN_DRIVERS: usize = 3;

/// Minimum activation narrative length, in characters.
pub const MIN_DRIVER_STORY_LENGTH: usize = 100;

/// Minimum project segment length, in characters.
pub const MIN_SEGMENT_LENGTH: usize = 3;

/// Stage-aware validator configured from `[quality]`.
#[derive(Debug, Clone)]
pub struct StageValidator {
    min_insights: usize,
    reject_fallback: bool,
}

impl StageValidator {
    /// Validator that rejects fallback-flagged values.
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            min_insights: config.min_insights,
            reject_fallback: true,
        }
    }

    /// Let fallback-flagged values through the generic rule.
    pub fn accepting_fallback(mut self) -> Self {
        self.reject_fallback = false;
        self
    }

    pub fn validate_stage_result(&self, stage: StageName, value: &Value) -> bool {
        self.rejections(stage, value).is_empty()
    }

    /// Every rule `value` breaks for `stage`. Empty means accepted.
    pub fn rejections(&self, stage: StageName, value: &Value) -> Vec<String> {
        if is_empty_value(value) {
            return vec!["empty result".into()];
        }

        let mut reasons = Vec::new();
        if self.reject_fallback && is_fallback(value) {
            reasons.push("result is flagged as fallback".into());
        }
        if is_emergency(value) {
            reasons.push("result reports emergency mode".into());
        }

        match stage {
            StageName::ProjectData => check_project_data(value, &mut reasons),
            StageName::WebSearch => check_web_search(value, &mut reasons),
            StageName::AiAnalysis => {
                if !value.is_object() {
                    reasons.push("AI analysis is not a mapping".into());
                }
            }
            StageName::Avatar => check_avatar(value, &mut reasons),
            StageName::Positioning => check_positioning(value, &mut reasons),
            StageName::CompetitorAnalysis => check_competitors(value, &mut reasons),
            StageName::MentalDrivers => check_drivers(value, &mut reasons),
            StageName::Insights => self.check_insights(value, &mut reasons),
            StageName::VisualProofs
            | StageName::AntiObjection
            | StageName::PrePitch
            | StageName::FuturePredictions => {}
        }

        if !reasons.is_empty() {
            debug!(stage = %stage, ?reasons, "stage result rejected");
        }
        reasons
    }

    fn check_insights(&self, value: &Value, reasons: &mut Vec<String>) {
        let Some(items) = value.as_array() else {
            reasons.push("insights are not a list".into());
            return;
        };
        if items.len() < self.min_insights {
            reasons.push(format!(
                "{} insights, at least {} required",
                items.len(),
                self.min_insights
            ));
        }
        let templated = items
            .iter()
            .filter(|item| item.as_str().is_none_or(looks_templated))
            .count();
        if templated > 0 {
            reasons.push(format!("{templated} insights look templated"));
        }
    }
}

// ---------------------------------------------------------------------------
// Stage rules
// ---------------------------------------------------------------------------

fn check_project_data(value: &Value, reasons: &mut Vec<String>) {
    let len = value
        .get("segment")
        .and_then(Value::as_str)
        .map(|s| s.trim().chars().count())
        .unwrap_or(0);
    if len < MIN_SEGMENT_LENGTH {
        reasons.push(format!(
            "segment must be at least {MIN_SEGMENT_LENGTH} characters"
        ));
    }
}

fn check_web_search(value: &Value, reasons: &mut Vec<String>) {
    let sources = value
        .get("totalSources")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if sources == 0 {
        reasons.push("no sources discovered".into());
    }
}

fn check_avatar(value: &Value, reasons: &mut Vec<String>) {
    let demographics_empty = value
        .get("demographicProfile")
        .is_none_or(is_empty_value);
    if demographics_empty {
        reasons.push("demographic profile is empty".into());
    }

    let pains = text_items(value.get("painPoints"));
    if pains.len() < MIN_AVATAR_ITEMS {
        reasons.push(format!(
            "{} pain points, at least {MIN_AVATAR_ITEMS} required",
            pains.len()
        ));
    }
    if let Some(pos) = pains
        .iter()
        .take(INSPECTED_PAIN_POINTS)
        .position(|p| p.is_none_or(looks_templated))
    {
        reasons.push(format!("pain point {} looks templated", pos + 1));
    }

    let desires = text_items(value.get("desires"));
    if desires.len() < MIN_AVATAR_ITEMS {
        reasons.push(format!(
            "{} desires, at least {MIN_AVATAR_ITEMS} required",
            desires.len()
        ));
    }
}

fn check_positioning(value: &Value, reasons: &mut Vec<String>) {
    let authentic = ["marketPositioning", "uniqueValueProposition"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .any(|text| !looks_templated(text));
    if !authentic {
        reasons.push("no authentic market positioning or value proposition".into());
    }
}

fn check_competitors(value: &Value, reasons: &mut Vec<String>) {
    let named = value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|c| {
                    c.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|n| !n.trim().is_empty())
                })
                .count()
        })
        .unwrap_or(0);
    if named == 0 {
        reasons.push("no named competitors".into());
    }
}

fn check_drivers(value: &Value, reasons: &mut Vec<String>) {
    let drivers = value
        .get("drivers")
        .or(Some(value))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    if drivers.len() < MIN_DRIVERS {
        reasons.push(format!(
            "{} mental drivers, at least {MIN_DRIVERS} required",
            drivers.len()
        ));
    }

    for (i, driver) in drivers.iter().enumerate() {
        let named = driver
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|n| !n.trim().is_empty());
        if !named {
            reasons.push(format!("driver {} has no name", i + 1));
        }

        let story = driver
            .pointer("/activationScript/story")
            .and_then(Value::as_str)
            .unwrap_or("");
        if story.chars().count() < MIN_DRIVER_STORY_LENGTH {
            reasons.push(format!(
                "driver {} narrative shorter than {MIN_DRIVER_STORY_LENGTH} characters",
                i + 1
            ));
        } else if looks_templated(story) {
            reasons.push(format!("driver {} narrative looks templated", i + 1));
        }
    }
}

/// Text of each list item: plain strings, or a mapping's `description`.
fn text_items(value: Option<&Value>) -> Vec<Option<&str>> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    item.as_str()
                        .or_else(|| item.get("description").and_then(Value::as_str))
                })
                .collect()
        })
        .unwrap_or_default()
}
