//! Core domain types for reportforge pipeline runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run correlation tokens (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new time-sortable session identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// StageName
// ---------------------------------------------------------------------------

/// Every stage the report pipeline knows about, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageName {
    ProjectData,
    WebSearch,
    AiAnalysis,
    Avatar,
    Positioning,
    CompetitorAnalysis,
    MentalDrivers,
    VisualProofs,
    AntiObjection,
    PrePitch,
    FuturePredictions,
    Insights,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [StageName; 12] = [
        Self::ProjectData,
        Self::WebSearch,
        Self::AiAnalysis,
        Self::Avatar,
        Self::Positioning,
        Self::CompetitorAnalysis,
        Self::MentalDrivers,
        Self::VisualProofs,
        Self::AntiObjection,
        Self::PrePitch,
        Self::FuturePredictions,
        Self::Insights,
    ];

    /// Foundational stages with no acceptable empty outcome.
    pub const MANDATORY: [StageName; 3] = [Self::ProjectData, Self::WebSearch, Self::AiAnalysis];

    /// Sections that must appear in every final report (mandatory included).
    pub const REQUIRED_FOR_REPORT: [StageName; 6] = [
        Self::ProjectData,
        Self::WebSearch,
        Self::AiAnalysis,
        Self::Avatar,
        Self::Positioning,
        Self::Insights,
    ];

    /// Key under which the stage's result is stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectData => "projectData",
            Self::WebSearch => "webSearch",
            Self::AiAnalysis => "aiAnalysis",
            Self::Avatar => "avatar",
            Self::Positioning => "positioning",
            Self::CompetitorAnalysis => "competitorAnalysis",
            Self::MentalDrivers => "mentalDrivers",
            Self::VisualProofs => "visualProofs",
            Self::AntiObjection => "antiObjection",
            Self::PrePitch => "prePitch",
            Self::FuturePredictions => "futurePredictions",
            Self::Insights => "insights",
        }
    }

    /// Prefix used on every failure message the stage produces.
    pub fn failure_code(&self) -> &'static str {
        match self {
            Self::ProjectData => "PROJECT_DATA_FAILED",
            Self::WebSearch => "WEB_SEARCH_FAILED",
            Self::AiAnalysis => "AI_ANALYSIS_FAILED",
            Self::Avatar => "AVATAR_FAILED",
            Self::Positioning => "POSITIONING_FAILED",
            Self::CompetitorAnalysis => "COMPETITOR_ANALYSIS_FAILED",
            Self::MentalDrivers => "MENTAL_DRIVERS_FAILED",
            Self::VisualProofs => "VISUAL_PROOFS_FAILED",
            Self::AntiObjection => "ANTI_OBJECTION_FAILED",
            Self::PrePitch => "PRE_PITCH_FAILED",
            Self::FuturePredictions => "FUTURE_PREDICTIONS_FAILED",
            Self::Insights => "INSIGHTS_FAILED",
        }
    }

    pub fn is_mandatory(&self) -> bool {
        Self::MANDATORY.contains(self)
    }

    pub fn is_required_for_report(&self) -> bool {
        Self::REQUIRED_FOR_REPORT.contains(self)
    }

    /// Look a stage up by its storage key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == key)
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PipelineInput
// ---------------------------------------------------------------------------

/// Scalar project parameters supplied by the caller. Immutable for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInput {
    /// Market segment under study. Must be at least 3 characters.
    pub segment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// Target audience description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_goal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketing_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_timeline: Option<String>,
    /// Free-text notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Optional pre-built search query, tried before generated ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl PipelineInput {
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            ..Default::default()
        }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// The input as a JSON mapping (base layer of every stage's view).
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run results
// ---------------------------------------------------------------------------

/// Completeness classification derived from the success rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Complete,
    PartialValid,
    MinimumPreserved,
}

impl AnalysisStatus {
    /// `COMPLETE` at 80% or more, `PARTIAL_VALID` at 60% or more.
    pub fn from_success_rate(rate: f64) -> Self {
        if rate >= 80.0 {
            Self::Complete
        } else if rate >= 60.0 {
            Self::PartialValid
        } else {
            Self::MinimumPreserved
        }
    }
}

/// Which stages ran and how that went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub executed: Vec<StageName>,
    pub failed: Vec<StageName>,
    pub success_rate: f64,
    pub session_id: String,
}

/// Aggregate quality verdict for one consolidated report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    /// Weighted score in `[0, 100]`.
    pub score: f64,
    pub issues: Vec<String>,
    pub meets_minimum: bool,
}

/// Consolidated run output before metadata is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedReport {
    pub project_data: Value,
    pub pipeline_status: PipelineStatus,
    /// One entry per successful (or synthesized) stage, keyed by stage name.
    #[serde(flatten)]
    pub sections: Map<String, Value>,
    pub status: AnalysisStatus,
}

impl ConsolidatedReport {
    pub fn section(&self, stage: StageName) -> Option<&Value> {
        self.sections.get(stage.as_str())
    }

    /// Whether a stage's output is present, `projectData` included.
    pub fn has_section(&self, stage: StageName) -> bool {
        match stage {
            StageName::ProjectData => self.project_data.is_object(),
            other => self.sections.contains_key(other.as_str()),
        }
    }
}

/// Run metadata attached once at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub processing_time_seconds: f64,
    pub session_id: String,
    pub successful_components: Vec<StageName>,
    pub failed_components: Vec<StageName>,
    /// Sections synthesized after the stage loop instead of produced by it.
    pub recovered_sections: Vec<StageName>,
    pub success_rate: f64,
    pub generated_at: String,
    pub quality_score: f64,
    pub quality_issues: Vec<String>,
    pub quality_guaranteed: bool,
    pub enhancement_applied: bool,
    pub pipeline_version: String,
    pub simulation_free: bool,
    pub raw_data_filtered: bool,
}

/// The one value a successful run returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalAnalysis {
    pub project_data: Value,
    pub pipeline_status: PipelineStatus,
    #[serde(flatten)]
    pub sections: Map<String, Value>,
    pub status: AnalysisStatus,
    pub metadata: AnalysisMetadata,
}

impl FinalAnalysis {
    pub fn from_report(report: ConsolidatedReport, metadata: AnalysisMetadata) -> Self {
        Self {
            project_data: report.project_data,
            pipeline_status: report.pipeline_status,
            sections: report.sections,
            status: report.status,
            metadata,
        }
    }

    pub fn section(&self, stage: StageName) -> Option<&Value> {
        self.sections.get(stage.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_roundtrip() {
        let id = SessionId::new();
        let s = id.to_string();
        let parsed: SessionId = s.parse().expect("parse SessionId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn stage_order_and_sets() {
        assert_eq!(StageName::ALL.first(), Some(&StageName::ProjectData));
        assert_eq!(StageName::ALL.last(), Some(&StageName::Insights));
        assert!(StageName::WebSearch.is_mandatory());
        assert!(!StageName::Avatar.is_mandatory());
        assert!(StageName::Avatar.is_required_for_report());
        assert!(!StageName::PrePitch.is_required_for_report());
        for stage in StageName::ALL {
            assert_eq!(StageName::from_key(stage.as_str()), Some(stage));
        }
    }

    #[test]
    fn stage_name_serializes_as_key() {
        let json = serde_json::to_string(&StageName::MentalDrivers).expect("serialize");
        assert_eq!(json, r#""mentalDrivers""#);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(AnalysisStatus::from_success_rate(100.0), AnalysisStatus::Complete);
        assert_eq!(AnalysisStatus::from_success_rate(80.0), AnalysisStatus::Complete);
        assert_eq!(AnalysisStatus::from_success_rate(66.6), AnalysisStatus::PartialValid);
        assert_eq!(
            AnalysisStatus::from_success_rate(25.0),
            AnalysisStatus::MinimumPreserved
        );
        let json = serde_json::to_string(&AnalysisStatus::PartialValid).expect("serialize");
        assert_eq!(json, r#""PARTIAL_VALID""#);
    }

    #[test]
    fn input_map_uses_camel_case_and_skips_missing() {
        let input = PipelineInput {
            revenue_goal: Some(100_000.0),
            ..PipelineInput::new("Digital Education").with_product("Online Course")
        };
        let map = input.to_map();
        assert_eq!(map["segment"], "Digital Education");
        assert_eq!(map["revenueGoal"], 100_000.0);
        assert!(!map.contains_key("audience"));
    }

    #[test]
    fn final_analysis_flattens_sections() {
        let mut sections = Map::new();
        sections.insert("avatar".into(), serde_json::json!({"fictionalName": "Ana"}));
        let report = ConsolidatedReport {
            project_data: serde_json::json!({"segment": "Fintech"}),
            pipeline_status: PipelineStatus {
                executed: vec![StageName::ProjectData],
                failed: vec![StageName::Avatar],
                success_rate: 50.0,
                session_id: "s-1".into(),
            },
            sections,
            status: AnalysisStatus::MinimumPreserved,
        };
        assert!(report.has_section(StageName::ProjectData));
        assert!(report.has_section(StageName::Avatar));
        assert!(!report.has_section(StageName::Insights));

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["avatar"]["fictionalName"], "Ana");
        assert_eq!(json["pipelineStatus"]["failed"][0], "avatar");
        assert_eq!(json["status"], "MINIMUM_PRESERVED");
    }
}
