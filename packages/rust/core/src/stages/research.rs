//! Foundational stages: project data, web search, AI analysis.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use reportforge_quality::count_simulation_markers;
use reportforge_shared::{PipelineSettings, StageFailure, StageName};

use super::{Stage, collaborator_failure, section};
use crate::ai_response::parse_analysis;
use crate::collaborators::{InferenceProvider, SearchOptions, SearchProvider, SearchResponse};
use crate::prompt::{analysis_prompt, search_context};
use crate::search::{ConsolidatedSearch, consolidate, consolidate_basic, generate_queries};

const MIN_SEGMENT_CHARS: usize = 3;

/// Sections the analysis document must contain for downstream stages.
const ANALYSIS_SECTIONS: [StageName; 3] =
    [StageName::Avatar, StageName::Positioning, StageName::Insights];

// ---------------------------------------------------------------------------
// projectData
// ---------------------------------------------------------------------------

/// Normalizes the caller's input: trims strings, drops blanks and nulls.
pub struct ProjectDataStage;

#[async_trait]
impl Stage for ProjectDataStage {
    fn name(&self) -> StageName {
        StageName::ProjectData
    }

    async fn run(&self, data: &Map<String, Value>, _session_id: &str) -> Result<Value, StageFailure> {
        let mut out = Map::new();
        for (key, value) in data {
            match value {
                Value::Null => {}
                Value::String(s) => {
                    let trimmed = s.trim();
                    if !trimmed.is_empty() {
                        out.insert(key.clone(), Value::from(trimmed));
                    }
                }
                other => {
                    out.insert(key.clone(), other.clone());
                }
            }
        }

        let segment_len = out
            .get("segment")
            .and_then(Value::as_str)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        if segment_len < MIN_SEGMENT_CHARS {
            return Err(StageFailure::new(
                StageName::ProjectData,
                format!("segment must be at least {MIN_SEGMENT_CHARS} characters"),
            ));
        }

        Ok(Value::Object(out))
    }
}

// ---------------------------------------------------------------------------
// webSearch
// ---------------------------------------------------------------------------

pub struct WebSearchStage {
    search: Arc<dyn SearchProvider>,
    settings: Arc<PipelineSettings>,
}

impl WebSearchStage {
    pub fn new(search: Arc<dyn SearchProvider>, settings: Arc<PipelineSettings>) -> Self {
        Self { search, settings }
    }
}

#[async_trait]
impl Stage for WebSearchStage {
    fn name(&self) -> StageName {
        StageName::WebSearch
    }

    async fn run(&self, data: &Map<String, Value>, _session_id: &str) -> Result<Value, StageFailure> {
        let stage = StageName::WebSearch;
        let queries = generate_queries(data, self.settings.max_generated_queries);
        let Some(first) = queries.first().cloned() else {
            return Err(StageFailure::new(stage, "no search queries could be generated"));
        };

        let context = section(data, StageName::ProjectData)
            .and_then(Value::as_object)
            .unwrap_or(data);
        let options = SearchOptions {
            max_results: self.settings.max_results_per_query,
            require_high_quality: self.settings.require_high_quality,
        };

        let executed: Vec<String> = queries
            .into_iter()
            .take(self.settings.max_queries)
            .collect();
        let mut accepted: Vec<SearchResponse> = Vec::new();

        for query in &executed {
            match self.search.search(query, context, options).await {
                Ok(response) if response.meets_quality_requirements => {
                    debug!(query = %query, hits = response.search_results.len(), "query accepted");
                    accepted.push(response);
                }
                Ok(_) => {
                    debug!(query = %query, "query below quality requirements");
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "search query failed");
                }
            }
        }

        let (consolidated, mode) = if accepted.is_empty() {
            warn!(query = %first, "primary search produced nothing usable, trying basic search");
            let hits = self
                .search
                .search_basic(&first, self.settings.secondary_search_limit)
                .await
                .map_err(collaborator_failure(stage))?;
            if hits.is_empty() {
                return Err(StageFailure::new(
                    stage,
                    "no quality results from primary or secondary search",
                ));
            }
            (consolidate_basic(&hits), "secondary")
        } else {
            (consolidate(&accepted), "primary")
        };

        info!(
            sources = consolidated.total_sources,
            domains = consolidated.unique_domains,
            mode,
            "web search consolidated"
        );
        search_output(consolidated, executed, mode)
    }
}

fn search_output(
    consolidated: ConsolidatedSearch,
    executed: Vec<String>,
    mode: &str,
) -> Result<Value, StageFailure> {
    let mut value = serde_json::to_value(consolidated)
        .map_err(|e| StageFailure::new(StageName::WebSearch, e.to_string()))?;
    if let Some(map) = value.as_object_mut() {
        map.insert("queriesExecuted".into(), Value::from(executed));
        map.insert("searchMode".into(), Value::from(mode));
        map.insert(
            "timestamp".into(),
            Value::from(chrono::Utc::now().to_rfc3339()),
        );
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// aiAnalysis
// ---------------------------------------------------------------------------

pub struct AiAnalysisStage {
    inference: Arc<dyn InferenceProvider>,
    settings: Arc<PipelineSettings>,
}

impl AiAnalysisStage {
    pub fn new(inference: Arc<dyn InferenceProvider>, settings: Arc<PipelineSettings>) -> Self {
        Self {
            inference,
            settings,
        }
    }
}

#[async_trait]
impl Stage for AiAnalysisStage {
    fn name(&self) -> StageName {
        StageName::AiAnalysis
    }

    async fn run(&self, data: &Map<String, Value>, _session_id: &str) -> Result<Value, StageFailure> {
        let stage = StageName::AiAnalysis;
        let web_search = section(data, StageName::WebSearch)
            .ok_or_else(|| StageFailure::new(stage, "web search results are missing"))?;

        let prompt = analysis_prompt(data, &search_context(web_search));
        let response = self
            .inference
            .generate(&prompt, self.settings.ai_max_tokens)
            .await
            .map_err(collaborator_failure(stage))?;
        if response.trim().is_empty() {
            return Err(StageFailure::new(stage, "model returned an empty response"));
        }

        let analysis = parse_analysis(&response).map_err(|e| StageFailure::new(stage, e.to_string()))?;

        let missing: Vec<&str> = ANALYSIS_SECTIONS
            .iter()
            .filter(|s| analysis.get(s.as_str()).is_none_or(Value::is_null))
            .map(|s| s.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(StageFailure::new(
                stage,
                format!("analysis is missing sections: {}", missing.join(", ")),
            ));
        }

        let markers = count_simulation_markers(&analysis);
        if markers > 0 {
            warn!(markers, "analysis contains simulated or templated phrasing");
        }

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{FakeInference, FakeSearch, map};

    fn settings() -> Arc<PipelineSettings> {
        Arc::new(PipelineSettings::default())
    }

    #[tokio::test]
    async fn project_data_trims_and_drops_blanks() {
        let data = map(json!({
            "segment": "  Digital Education ",
            "product": "",
            "audience": null,
            "price": 497.0
        }));
        let out = ProjectDataStage.run(&data, "s").await.expect("valid");
        assert_eq!(out["segment"], "Digital Education");
        assert_eq!(out["price"], 497.0);
        assert!(out.get("product").is_none());
        assert!(out.get("audience").is_none());
    }

    #[tokio::test]
    async fn project_data_rejects_short_segment() {
        let data = map(json!({"segment": " ab "}));
        let err = ProjectDataStage.run(&data, "s").await.unwrap_err();
        assert_eq!(err.code, "PROJECT_DATA_FAILED");
    }

    #[tokio::test]
    async fn web_search_consolidates_accepted_queries() {
        let search = Arc::new(FakeSearch::qualifying(3));
        let stage = WebSearchStage::new(search.clone(), settings());
        let data = map(json!({"segment": "Digital Education", "product": "Online Course"}));

        let out = stage.run(&data, "s").await.expect("search");
        assert_eq!(out["searchMode"], "primary");
        assert_eq!(out["queriesExecuted"].as_array().map(Vec::len), Some(5));
        assert_eq!(out["totalSources"], 6);
        assert!(out["detailedResults"].is_array());
        assert_eq!(search.calls(), 5);
    }

    #[tokio::test]
    async fn web_search_falls_back_to_basic() {
        let search = Arc::new(FakeSearch::qualifying(0).with_basic_hits(2));
        let stage = WebSearchStage::new(search, settings());
        let data = map(json!({"segment": "Digital Education"}));

        let out = stage.run(&data, "s").await.expect("secondary search");
        assert_eq!(out["searchMode"], "secondary");
        assert_eq!(out["totalSources"], 2);
    }

    #[tokio::test]
    async fn web_search_fails_when_nothing_found() {
        let stage = WebSearchStage::new(Arc::new(FakeSearch::failing()), settings());
        let data = map(json!({"segment": "Digital Education"}));
        let err = stage.run(&data, "s").await.unwrap_err();
        assert_eq!(err.code, "WEB_SEARCH_FAILED");
    }

    #[tokio::test]
    async fn ai_analysis_parses_fenced_json() {
        let stage = AiAnalysisStage::new(Arc::new(FakeInference::good()), settings());
        let data = map(json!({
            "segment": "Digital Education",
            "webSearch": {"totalSources": 5, "sourcesSummary": []}
        }));
        let out = stage.run(&data, "s").await.expect("analysis");
        assert!(out["avatar"]["painPoints"].is_array());
    }

    #[tokio::test]
    async fn ai_analysis_requires_search_and_sections() {
        let stage = AiAnalysisStage::new(Arc::new(FakeInference::good()), settings());
        let err = stage
            .run(&map(json!({"segment": "Fintech"})), "s")
            .await
            .unwrap_err();
        assert!(err.cause.contains("web search"));

        let stage = AiAnalysisStage::new(
            Arc::new(FakeInference::text("```json\n{\"avatar\": {}}\n```")),
            settings(),
        );
        let data = map(json!({"segment": "Fintech", "webSearch": {"totalSources": 1}}));
        let err = stage.run(&data, "s").await.unwrap_err();
        assert!(err.cause.contains("positioning, insights"));
    }

    #[tokio::test]
    async fn ai_analysis_model_error_fails() {
        let stage = AiAnalysisStage::new(Arc::new(FakeInference::Failing), settings());
        let data = map(json!({"segment": "Fintech", "webSearch": {"totalSources": 1}}));
        let err = stage.run(&data, "s").await.unwrap_err();
        assert_eq!(err.to_string(), "AI_ANALYSIS_FAILED: inference failed: model unavailable");
    }

    #[tokio::test]
    async fn ai_analysis_invalid_json_fails() {
        let stage = AiAnalysisStage::new(Arc::new(FakeInference::text("no json here")), settings());
        let data = map(json!({"segment": "Fintech", "webSearch": {"totalSources": 1}}));
        let err = stage.run(&data, "s").await.unwrap_err();
        assert_eq!(err.code, "AI_ANALYSIS_FAILED");
        assert!(err.cause.contains("parse error"));
    }
}
