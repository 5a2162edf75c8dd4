use async_trait::async_trait;
use serde_json::{Map, Value};

use reportforge_quality::is_empty_value;
use reportforge_shared::{StageFailure, StageName};

use super::{Stage, section};

/// Lifts one section out of the AI analysis document.
pub struct ExtractStage {
    stage: StageName,
}

impl ExtractStage {
    pub fn new(stage: StageName) -> Self {
        Self { stage }
    }
}

#[async_trait]
impl Stage for ExtractStage {
    fn name(&self) -> StageName {
        self.stage
    }

    async fn run(&self, data: &Map<String, Value>, _session_id: &str) -> Result<Value, StageFailure> {
        let analysis = section(data, StageName::AiAnalysis)
            .ok_or_else(|| StageFailure::new(self.stage, "AI analysis is missing"))?;

        let value = analysis
            .get(self.stage.as_str())
            .filter(|v| !is_empty_value(v))
            .cloned()
            .ok_or_else(|| {
                StageFailure::new(
                    self.stage,
                    format!("AI analysis has no {} section", self.stage),
                )
            })?;

        match self.stage {
            StageName::Avatar if value.get("demographicProfile").is_none_or(is_empty_value) => {
                Err(StageFailure::new(self.stage, "avatar has no demographic profile"))
            }
            StageName::CompetitorAnalysis if !value.is_array() => Err(StageFailure::new(
                self.stage,
                "competitor analysis is not a list",
            )),
            _ => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::map;

    #[tokio::test]
    async fn extracts_named_section() {
        let data = map(json!({
            "aiAnalysis": {
                "positioning": {"marketPositioning": "Premium outcome-led courses"},
                "competitorAnalysis": [{"name": "Acme Academy"}]
            }
        }));
        let out = ExtractStage::new(StageName::Positioning)
            .run(&data, "s")
            .await
            .expect("positioning");
        assert_eq!(out["marketPositioning"], "Premium outcome-led courses");

        let out = ExtractStage::new(StageName::CompetitorAnalysis)
            .run(&data, "s")
            .await
            .expect("competitors");
        assert_eq!(out[0]["name"], "Acme Academy");
    }

    #[tokio::test]
    async fn avatar_needs_demographics() {
        let data = map(json!({"aiAnalysis": {"avatar": {"painPoints": ["a"]}}}));
        let err = ExtractStage::new(StageName::Avatar)
            .run(&data, "s")
            .await
            .unwrap_err();
        assert_eq!(err.code, "AVATAR_FAILED");
    }

    #[tokio::test]
    async fn missing_section_or_analysis_fails() {
        let err = ExtractStage::new(StageName::Positioning)
            .run(&map(json!({})), "s")
            .await
            .unwrap_err();
        assert!(err.cause.contains("AI analysis is missing"));

        let data = map(json!({"aiAnalysis": {"competitorAnalysis": {"name": "x"}}}));
        assert!(
            ExtractStage::new(StageName::CompetitorAnalysis)
                .run(&data, "s")
                .await
                .is_err()
        );
    }
}
