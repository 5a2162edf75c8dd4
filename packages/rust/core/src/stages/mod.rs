//! The twelve report stages.
//!
//! Each stage reads the accumulated run state (project input overlaid with
//! every earlier stage's output, keyed by stage name) and returns one JSON
//! value or a [`StageFailure`]. Stages never touch the state themselves;
//! the pipeline validates and stores what they return.

mod artifacts;
mod extract;
mod insights;
mod research;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use reportforge_shared::{AppConfig, ReportforgeError, StageFailure, StageName};

use crate::collaborators::Collaborators;

pub use artifacts::{
    AntiObjectionStage, FuturePredictionsStage, MentalDriversStage, PrePitchStage,
    VisualProofsStage,
};
pub use extract::ExtractStage;
pub use insights::InsightsStage;
pub use research::{AiAnalysisStage, ProjectDataStage, WebSearchStage};

/// One named unit of pipeline work.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    async fn run(&self, data: &Map<String, Value>, session_id: &str) -> Result<Value, StageFailure>;
}

/// The standard stage list, in execution order.
pub fn standard_stages(collaborators: &Collaborators, config: &AppConfig) -> Vec<Box<dyn Stage>> {
    let settings = Arc::new(config.pipeline.clone());
    vec![
        Box::new(ProjectDataStage),
        Box::new(WebSearchStage::new(
            collaborators.search.clone(),
            settings.clone(),
        )),
        Box::new(AiAnalysisStage::new(
            collaborators.inference.clone(),
            settings.clone(),
        )),
        Box::new(ExtractStage::new(StageName::Avatar)),
        Box::new(ExtractStage::new(StageName::Positioning)),
        Box::new(ExtractStage::new(StageName::CompetitorAnalysis)),
        Box::new(MentalDriversStage::new(collaborators.artifacts.clone())),
        Box::new(VisualProofsStage::new(collaborators.artifacts.clone())),
        Box::new(AntiObjectionStage::new(collaborators.artifacts.clone())),
        Box::new(PrePitchStage::new(collaborators.artifacts.clone())),
        Box::new(FuturePredictionsStage::new(
            collaborators.artifacts.clone(),
            settings,
        )),
        Box::new(InsightsStage::new(config.quality.clone())),
    ]
}

// ---------------------------------------------------------------------------
// Helpers shared by stages
// ---------------------------------------------------------------------------

/// A trimmed, non-empty text parameter, preferring the validated
/// `projectData` section over the raw input layer.
pub fn text_field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    let from_project = data
        .get(StageName::ProjectData.as_str())
        .and_then(|pd| pd.get(key))
        .and_then(Value::as_str);
    let from_input = data.get(key).and_then(Value::as_str);

    [from_project, from_input]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Output of an earlier stage, if it ran.
pub(crate) fn section<'a>(data: &'a Map<String, Value>, stage: StageName) -> Option<&'a Value> {
    data.get(stage.as_str())
}

/// Wrap a collaborator error as a failure of `stage`.
pub(crate) fn collaborator_failure(stage: StageName) -> impl Fn(ReportforgeError) -> StageFailure {
    move |e| StageFailure::new(stage, e.to_string())
}

/// Strings in a list field; mappings contribute their `description`.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.as_str()
                        .or_else(|| item.get("description").and_then(Value::as_str))
                })
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
