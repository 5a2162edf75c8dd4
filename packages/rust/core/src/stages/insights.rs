use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use reportforge_quality::{is_fallback, looks_templated};
use reportforge_shared::{QualityConfig, StageFailure, StageName};

use super::{Stage, section, string_list};

/// Merges insights from the analysis, the search statistics, and the
/// generated components into one filtered list.
pub struct InsightsStage {
    config: QualityConfig,
}

impl InsightsStage {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    fn accept(&self, text: &str) -> bool {
        text.chars().count() > self.config.min_insight_length && !looks_templated(text)
    }
}

#[async_trait]
impl Stage for InsightsStage {
    fn name(&self) -> StageName {
        StageName::Insights
    }

    async fn run(&self, data: &Map<String, Value>, _session_id: &str) -> Result<Value, StageFailure> {
        // Insights of a recovered analysis are templates, not research.
        let candidates: Vec<String> = genuine_section(data, StageName::AiAnalysis)
            .map(|ai| string_list(ai.get("insights")))
            .unwrap_or_default()
            .into_iter()
            .chain(search_insights(data))
            .chain(component_insights(data))
            .collect();
        let total = candidates.len();

        let mut seen = HashSet::new();
        let insights: Vec<String> = candidates
            .into_iter()
            .map(|text| text.trim().to_string())
            .filter(|text| self.accept(text))
            .filter(|text| seen.insert(text.to_lowercase()))
            .take(self.config.max_insights)
            .collect();

        debug!(total, kept = insights.len(), "insights filtered");
        if insights.is_empty() {
            return Err(StageFailure::new(
                StageName::Insights,
                "no insight survived filtering",
            ));
        }
        Ok(Value::from(insights))
    }
}

fn genuine_section(data: &Map<String, Value>, stage: StageName) -> Option<&Value> {
    section(data, stage).filter(|value| !is_fallback(value))
}

fn search_insights(data: &Map<String, Value>) -> Vec<String> {
    let Some(ws) = genuine_section(data, StageName::WebSearch) else {
        return Vec::new();
    };
    let num = |key: &str| ws.get(key).and_then(Value::as_f64).unwrap_or(0.0);

    let mut out = Vec::new();
    let sources = num("totalSources");
    if sources > 0.0 {
        out.push(format!(
            "Research drew on {} independent sources collected during the web search stage",
            sources as u64
        ));
    }
    let quality = num("avgQuality");
    if quality > 70.0 {
        out.push(format!(
            "Average source quality reached {quality:.1}%, which supports the reliability of these findings"
        ));
    }
    let domains = num("uniqueDomains");
    if domains > 5.0 {
        out.push(format!(
            "Source diversity: {} distinct domains were consulted across the executed queries",
            domains as u64
        ));
    }
    out
}

fn component_insights(data: &Map<String, Value>) -> Vec<String> {
    let mut out = Vec::new();

    let drivers = genuine_section(data, StageName::MentalDrivers)
        .and_then(|md| md.get("drivers").or(Some(md)))
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    if drivers > 0 {
        out.push(format!(
            "A system of {drivers} mental drivers was mapped to the avatar's pains and desires"
        ));
    }

    let proofs = genuine_section(data, StageName::VisualProofs)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    if proofs > 0 {
        out.push(format!(
            "{proofs} instant visual proofs were designed to demonstrate the core promise"
        ));
    }

    if genuine_section(data, StageName::AntiObjection).is_some() {
        out.push(
            "A complete anti-objection system with dedicated response scripts was produced".into(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::map;

    fn stage() -> InsightsStage {
        InsightsStage::new(QualityConfig::default())
    }

    #[tokio::test]
    async fn merges_filters_and_dedupes() {
        let long = "Course buyers in Brazil compare at least three providers before paying";
        let data = map(json!({
            "aiAnalysis": {"insights": [
                long,
                long.to_uppercase(),
                "too short",
                "This positioning is customized for the digital education audience in general",
            ]},
            "webSearch": {"totalSources": 12, "avgQuality": 82.5, "uniqueDomains": 9},
            "mentalDrivers": {"drivers": [{}, {}, {}]},
            "antiObjection": {"scripts": []}
        }));
        let out = stage().run(&data, "s").await.expect("insights");
        let items: Vec<&str> = out
            .as_array()
            .expect("list")
            .iter()
            .filter_map(Value::as_str)
            .collect();

        assert_eq!(items[0], long);
        assert_eq!(items.len(), 6);
        assert!(items.iter().any(|i| i.contains("12 independent sources")));
        assert!(items.iter().any(|i| i.contains("82.5%")));
        assert!(items.iter().any(|i| i.contains("9 distinct domains")));
        assert!(items.iter().any(|i| i.contains("3 mental drivers")));
        assert!(!items.iter().any(|i| i.contains("customized for")));
    }

    #[tokio::test]
    async fn capped_at_max() {
        let many: Vec<String> = (0..40)
            .map(|i| format!("Insight number {i} describes a distinct and measurable market behaviour"))
            .collect();
        let data = map(json!({"aiAnalysis": {"insights": many}}));
        let out = stage().run(&data, "s").await.expect("insights");
        assert_eq!(out.as_array().map(Vec::len), Some(25));
    }

    #[tokio::test]
    async fn recovered_sections_contribute_nothing() {
        let templates: Vec<String> = (0..12)
            .map(|i| format!("Recovered template insight {i} about the market and its buyers"))
            .collect();
        let data = map(json!({
            "aiAnalysis": {"insights": templates, "fallbackMode": true},
            "webSearch": {"totalSources": 1, "fallbackMode": true},
            "antiObjection": {"scripts": []}
        }));
        let out = stage().run(&data, "s").await.expect("insights");
        assert_eq!(
            out,
            json!(["A complete anti-objection system with dedicated response scripts was produced"])
        );
    }

    #[tokio::test]
    async fn nothing_usable_fails() {
        let data = map(json!({"aiAnalysis": {"insights": ["short"]}}));
        let err = stage().run(&data, "s").await.unwrap_err();
        assert_eq!(err.code, "INSIGHTS_FAILED");
    }
}
