//! Stages backed by the artifact generator.
//!
//! Generators report degraded output in-band (`fallbackMode`,
//! `EMERGENCY_MODE`). Those values are turned into stage failures here so a
//! fallback never lands in the report as if it were researched.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use reportforge_quality::{is_emergency, is_fallback};
use reportforge_shared::{PipelineSettings, StageFailure, StageName};

use super::{Stage, collaborator_failure, section, string_list, text_field};
use crate::collaborators::ArtifactGenerator;

/// Concepts taken from each avatar list for visual proofs.
const CONCEPTS_PER_LIST: usize = 3;

/// Pain points turned into objections when the avatar lists none.
const DERIVED_OBJECTIONS: usize = 5;

fn required_avatar(data: &Map<String, Value>, stage: StageName) -> Result<&Value, StageFailure> {
    section(data, StageName::Avatar)
        .ok_or_else(|| StageFailure::new(stage, "avatar is required"))
}

fn reject_fallback(stage: StageName, value: Value) -> Result<Value, StageFailure> {
    if is_fallback(&value) {
        return Err(StageFailure::new(stage, "generator returned fallback content"));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// mentalDrivers
// ---------------------------------------------------------------------------

pub struct MentalDriversStage {
    artifacts: Arc<dyn ArtifactGenerator>,
}

impl MentalDriversStage {
    pub fn new(artifacts: Arc<dyn ArtifactGenerator>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl Stage for MentalDriversStage {
    fn name(&self) -> StageName {
        StageName::MentalDrivers
    }

    async fn run(&self, data: &Map<String, Value>, _session_id: &str) -> Result<Value, StageFailure> {
        let stage = self.name();
        let avatar = required_avatar(data, stage)?;
        let drivers = self
            .artifacts
            .mental_drivers(avatar, data)
            .await
            .map_err(collaborator_failure(stage))?;
        reject_fallback(stage, drivers)
    }
}

// ---------------------------------------------------------------------------
// visualProofs
// ---------------------------------------------------------------------------

pub struct VisualProofsStage {
    artifacts: Arc<dyn ArtifactGenerator>,
}

impl VisualProofsStage {
    pub fn new(artifacts: Arc<dyn ArtifactGenerator>) -> Self {
        Self { artifacts }
    }
}

/// Leading desires and pains plus the positioning differentiators.
fn proof_concepts(avatar: &Value, positioning: Option<&Value>) -> Vec<String> {
    let mut concepts: Vec<String> = string_list(avatar.get("desires"))
        .into_iter()
        .take(CONCEPTS_PER_LIST)
        .chain(
            string_list(avatar.get("painPoints"))
                .into_iter()
                .take(CONCEPTS_PER_LIST),
        )
        .collect();
    if let Some(positioning) = positioning {
        concepts.extend(string_list(positioning.get("competitiveDifferentiators")));
    }
    concepts
}

#[async_trait]
impl Stage for VisualProofsStage {
    fn name(&self) -> StageName {
        StageName::VisualProofs
    }

    async fn run(&self, data: &Map<String, Value>, _session_id: &str) -> Result<Value, StageFailure> {
        let stage = self.name();
        let avatar = required_avatar(data, stage)?;
        let concepts = proof_concepts(avatar, section(data, StageName::Positioning));
        if concepts.is_empty() {
            return Err(StageFailure::new(stage, "no concepts to prove"));
        }

        let proofs = self
            .artifacts
            .visual_proofs(&concepts, avatar, data)
            .await
            .map_err(collaborator_failure(stage))?;
        if !proofs.is_array() {
            return Err(StageFailure::new(stage, "generator did not return a list of proofs"));
        }
        reject_fallback(stage, proofs)
    }
}

// ---------------------------------------------------------------------------
// antiObjection
// ---------------------------------------------------------------------------

pub struct AntiObjectionStage {
    artifacts: Arc<dyn ArtifactGenerator>,
}

impl AntiObjectionStage {
    pub fn new(artifacts: Arc<dyn ArtifactGenerator>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl Stage for AntiObjectionStage {
    fn name(&self) -> StageName {
        StageName::AntiObjection
    }

    async fn run(&self, data: &Map<String, Value>, _session_id: &str) -> Result<Value, StageFailure> {
        let stage = self.name();
        let avatar = required_avatar(data, stage)?;

        let mut objections = string_list(avatar.get("objections"));
        if objections.is_empty() {
            objections = string_list(avatar.get("painPoints"))
                .into_iter()
                .take(DERIVED_OBJECTIONS)
                .map(|pain| format!("Objection rooted in: {pain}"))
                .collect();
        }
        if objections.is_empty() {
            return Err(StageFailure::new(stage, "avatar has no objections or pain points"));
        }

        let system = self
            .artifacts
            .anti_objection(&objections, avatar, data)
            .await
            .map_err(collaborator_failure(stage))?;
        reject_fallback(stage, system)
    }
}

// ---------------------------------------------------------------------------
// prePitch
// ---------------------------------------------------------------------------

pub struct PrePitchStage {
    artifacts: Arc<dyn ArtifactGenerator>,
}

impl PrePitchStage {
    pub fn new(artifacts: Arc<dyn ArtifactGenerator>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl Stage for PrePitchStage {
    fn name(&self) -> StageName {
        StageName::PrePitch
    }

    async fn run(&self, data: &Map<String, Value>, _session_id: &str) -> Result<Value, StageFailure> {
        let stage = self.name();
        let avatar = required_avatar(data, stage)?;

        let drivers = section(data, StageName::MentalDrivers)
            .and_then(|md| md.get("drivers").or(Some(md)))
            .filter(|d| d.as_array().is_some_and(|list| !list.is_empty()))
            .ok_or_else(|| StageFailure::new(stage, "mental drivers are required"))?;

        let pitch = self
            .artifacts
            .pre_pitch(drivers, avatar, data)
            .await
            .map_err(collaborator_failure(stage))?;
        if is_emergency(&pitch) {
            return Err(StageFailure::new(stage, "generator reported emergency mode"));
        }
        Ok(pitch)
    }
}

// ---------------------------------------------------------------------------
// futurePredictions
// ---------------------------------------------------------------------------

pub struct FuturePredictionsStage {
    artifacts: Arc<dyn ArtifactGenerator>,
    settings: Arc<PipelineSettings>,
}

impl FuturePredictionsStage {
    pub fn new(artifacts: Arc<dyn ArtifactGenerator>, settings: Arc<PipelineSettings>) -> Self {
        Self {
            artifacts,
            settings,
        }
    }
}

#[async_trait]
impl Stage for FuturePredictionsStage {
    fn name(&self) -> StageName {
        StageName::FuturePredictions
    }

    async fn run(&self, data: &Map<String, Value>, _session_id: &str) -> Result<Value, StageFailure> {
        let stage = self.name();
        let segment = text_field(data, "segment")
            .ok_or_else(|| StageFailure::new(stage, "segment is required"))?;
        self.artifacts
            .future_predictions(segment, data, self.settings.prediction_horizon_months)
            .await
            .map_err(collaborator_failure(stage))
    }
}
