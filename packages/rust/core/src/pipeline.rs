//! Report pipeline: ordered stages → validation → recovery → scoring →
//! redaction → final analysis.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};
use tracing::{Instrument, error, info, info_span, instrument, warn};

use reportforge_quality::{
    StageValidator, avatar_depth_score, count_simulation_markers, is_fallback,
    score_final_analysis,
};
use reportforge_shared::{
    AnalysisMetadata, AnalysisStatus, AppConfig, ConsolidatedReport, FatalPipelineError,
    FinalAnalysis, PipelineInput, PipelineStatus, QualityConfig, QualityReport, StageFailure,
    StageName,
};

use crate::collaborators::{Collaborators, SessionIssuer, StepSink};
use crate::recovery::RecoveryGenerator;
use crate::redact::redact_sections;
use crate::stages::{Stage, standard_stages};

/// Category under which every journal entry of a run is saved.
pub const PERSIST_CATEGORY: &str = "full_analysis";

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a stage runs. `index` is 1-based.
    fn stage_started(&self, index: usize, total: usize, stage: StageName);
    /// Called once the final analysis is ready.
    fn finished(&self, analysis: &FinalAnalysis);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _index: usize, _total: usize, _stage: StageName) {}
    fn finished(&self, _analysis: &FinalAnalysis) {}
}

/// Result of one stage attempt, after validation.
#[derive(Debug)]
enum StageOutcome {
    Succeeded(Value),
    Failed(StageFailure),
}

/// Per-run mutable state. Lives on the stack of one `execute` call.
struct RunState {
    /// Input parameters overlaid with every accepted stage result.
    data: Map<String, Value>,
    executed: Vec<StageName>,
    failed: Vec<StageName>,
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    validator: StageValidator,
    recovery: RecoveryGenerator,
    quality: QualityConfig,
    pipeline_version: String,
    sink: Arc<dyn StepSink>,
    sessions: Arc<dyn SessionIssuer>,
}

impl Pipeline {
    /// Pipeline with the standard twelve stages.
    pub fn new(collaborators: Collaborators, config: &AppConfig) -> Self {
        let stages = standard_stages(&collaborators, config);
        Self::with_stages(stages, collaborators.sink, collaborators.sessions, config)
    }

    /// Pipeline over a custom stage list.
    pub fn with_stages(
        stages: Vec<Box<dyn Stage>>,
        sink: Arc<dyn StepSink>,
        sessions: Arc<dyn SessionIssuer>,
        config: &AppConfig,
    ) -> Self {
        Self {
            stages,
            validator: StageValidator::new(&config.quality),
            recovery: RecoveryGenerator::new(&config.quality),
            quality: config.quality.clone(),
            pipeline_version: config.pipeline.pipeline_version.clone(),
            sink,
            sessions,
        }
    }

    pub fn stage_names(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order and build the final analysis.
    ///
    /// Only a mandatory stage that fails and cannot be recovered aborts the
    /// run. Every other failure is recorded and the run continues.
    #[instrument(skip_all, fields(segment = %input.segment))]
    pub async fn execute(
        &self,
        input: &PipelineInput,
        session_id: Option<String>,
        progress: &dyn ProgressReporter,
    ) -> Result<FinalAnalysis, FatalPipelineError> {
        let start = Instant::now();
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.sessions.issue());

        info!(%session_id, stages = self.stages.len(), "starting report pipeline");

        let mut run = RunState {
            data: input.to_map(),
            executed: Vec::new(),
            failed: Vec::new(),
        };
        self.persist(&session_id, "pipeline_started", &Value::Object(run.data.clone()))
            .await;

        // --- Stage loop ---
        let total = self.stages.len();
        for (i, stage) in self.stages.iter().enumerate() {
            let name = stage.name();
            progress.stage_started(i + 1, total, name);

            let outcome = self
                .run_stage(stage.as_ref(), &run.data, &session_id)
                .instrument(info_span!("stage", name = %name))
                .await;

            match outcome {
                StageOutcome::Succeeded(value) => {
                    self.persist(&session_id, &format!("stage_{name}"), &value).await;
                    run.data.insert(name.as_str().to_string(), value);
                    run.executed.push(name);
                }
                StageOutcome::Failed(failure) => {
                    warn!(stage = %name, error = %failure, "stage failed");
                    run.failed.push(name);
                    self.persist_failure(&session_id, &failure).await;

                    if !name.is_mandatory() {
                        continue;
                    }
                    let Some(recovered) = self.recovery.recover(name, &run.data) else {
                        error!(stage = %name, "mandatory stage could not be recovered");
                        return Err(FatalPipelineError::MandatoryStageFailed {
                            stage: name,
                            cause: failure.to_string(),
                        });
                    };
                    warn!(stage = %name, "mandatory stage recovered with fallback content");
                    self.persist(&session_id, &format!("stage_{name}"), &recovered)
                        .await;
                    run.data.insert(name.as_str().to_string(), recovered);
                    run.executed.push(name);
                }
            }
        }

        let missing: Vec<StageName> = StageName::MANDATORY
            .into_iter()
            .filter(|s| !run.executed.contains(s))
            .collect();
        if !missing.is_empty() {
            error!(?missing, "mandatory stages missing after execution");
            return Err(FatalPipelineError::MandatoryStagesMissing { stages: missing });
        }

        // --- Consolidation ---
        let (mut report, recovered_sections) = self.consolidate(&run, &session_id);

        // --- Quality ---
        let mut quality = score_final_analysis(&report, &self.quality);
        let mut enhancement_applied = false;
        if !quality.meets_minimum {
            info!(score = quality.score, "quality below target, running enhance pass");
            enhancement_applied = self.enhance(&mut report, &run.data);
            if enhancement_applied {
                quality = score_final_analysis(&report, &self.quality);
            }
        }

        // --- Redaction ---
        report.sections = redact_sections(&report.sections);

        // Scraped page text is gone at this point; only generated content is inspected.
        let simulation_free = recovered_sections.is_empty()
            && report
                .sections
                .values()
                .all(|v| !is_fallback(v) && count_simulation_markers(v) == 0);

        let metadata = self.metadata(
            &report,
            &session_id,
            start,
            recovered_sections,
            quality,
            enhancement_applied,
            simulation_free,
        );
        let analysis = FinalAnalysis::from_report(report, metadata);

        match serde_json::to_value(&analysis) {
            Ok(snapshot) => self.persist(&session_id, "final_analysis", &snapshot).await,
            Err(e) => warn!(error = %e, "could not serialize final analysis"),
        }

        progress.finished(&analysis);

        info!(
            %session_id,
            status = ?analysis.status,
            score = analysis.metadata.quality_score,
            success_rate = analysis.metadata.success_rate,
            elapsed_ms = start.elapsed().as_millis(),
            "report pipeline complete"
        );

        Ok(analysis)
    }

    async fn run_stage(
        &self,
        stage: &dyn Stage,
        data: &Map<String, Value>,
        session_id: &str,
    ) -> StageOutcome {
        let name = stage.name();
        match stage.run(data, session_id).await {
            Ok(value) => {
                let reasons = self.validator.rejections(name, &value);
                if reasons.is_empty() {
                    StageOutcome::Succeeded(value)
                } else {
                    StageOutcome::Failed(StageFailure::rejected(name, &reasons))
                }
            }
            Err(failure) => StageOutcome::Failed(failure),
        }
    }

    /// Build the report from accepted stages and fill in any required
    /// section that is still missing.
    fn consolidate(&self, run: &RunState, session_id: &str) -> (ConsolidatedReport, Vec<StageName>) {
        let project_data = run
            .data
            .get(StageName::ProjectData.as_str())
            .cloned()
            .unwrap_or(Value::Null);

        let mut sections: Map<String, Value> = run
            .data
            .iter()
            .filter(|(key, _)| {
                StageName::from_key(key).is_some_and(|s| s != StageName::ProjectData)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut recovered = Vec::new();
        for stage in StageName::REQUIRED_FOR_REPORT {
            if stage.is_mandatory() || sections.contains_key(stage.as_str()) {
                continue;
            }
            if let Some(value) = self.recovery.recover(stage, &run.data) {
                warn!(stage = %stage, "required section synthesized from fallback");
                sections.insert(stage.as_str().to_string(), value);
                recovered.push(stage);
            }
        }

        let success_rate = round1(
            run.executed.len() as f64 / self.stages.len().max(1) as f64 * 100.0,
        );
        let report = ConsolidatedReport {
            project_data,
            pipeline_status: PipelineStatus {
                executed: run.executed.clone(),
                failed: run.failed.clone(),
                success_rate,
                session_id: session_id.to_string(),
            },
            sections,
            status: AnalysisStatus::from_success_rate(success_rate),
        };
        (report, recovered)
    }

    /// Best-effort fixes for a below-target report. Returns whether
    /// anything changed. There is no remedy for a low source count.
    fn enhance(&self, report: &mut ConsolidatedReport, context: &Map<String, Value>) -> bool {
        let mut applied = false;
        let insights_key = StageName::Insights.as_str();

        let mut insights: Vec<Value> = report
            .sections
            .get(insights_key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if insights.len() < self.quality.min_insights {
            let before = insights.len();
            for extra in self
                .recovery
                .supplemental_insights(context, self.quality.max_insights)
            {
                if insights.len() >= self.quality.min_insights {
                    break;
                }
                let extra = Value::from(extra);
                if !insights.contains(&extra) {
                    insights.push(extra);
                }
            }
            if insights.len() > before {
                info!(added = insights.len() - before, "insights topped up");
                report
                    .sections
                    .insert(insights_key.to_string(), Value::Array(insights));
                applied = true;
            }
        }

        let avatar_key = StageName::Avatar.as_str();
        let thin_avatar = report
            .sections
            .get(avatar_key)
            .filter(|avatar| avatar_depth_score(avatar) < 100);
        if let Some(avatar) = thin_avatar {
            let enriched = self.recovery.enrich_avatar(avatar, context);
            info!(
                before = avatar_depth_score(avatar),
                after = avatar_depth_score(&enriched),
                "avatar enriched"
            );
            report.sections.insert(avatar_key.to_string(), enriched);
            applied = true;
        }

        applied
    }

    #[allow(clippy::too_many_arguments)]
    fn metadata(
        &self,
        report: &ConsolidatedReport,
        session_id: &str,
        start: Instant,
        recovered_sections: Vec<StageName>,
        quality: QualityReport,
        enhancement_applied: bool,
        simulation_free: bool,
    ) -> AnalysisMetadata {
        let degraded = !recovered_sections.is_empty()
            || report.pipeline_status.failed.iter().any(|s| s.is_mandatory());
        AnalysisMetadata {
            processing_time_seconds: start.elapsed().as_secs_f64(),
            session_id: session_id.to_string(),
            successful_components: report.pipeline_status.executed.clone(),
            failed_components: report.pipeline_status.failed.clone(),
            recovered_sections,
            success_rate: report.pipeline_status.success_rate,
            generated_at: chrono::Utc::now().to_rfc3339(),
            quality_score: quality.score,
            quality_guaranteed: !degraded && quality.score >= self.quality.min_quality_score,
            quality_issues: quality.issues,
            enhancement_applied,
            pipeline_version: self.pipeline_version.clone(),
            simulation_free,
            raw_data_filtered: true,
        }
    }

    // -----------------------------------------------------------------------
    // Journal
    // -----------------------------------------------------------------------

    async fn persist(&self, session_id: &str, label: &str, payload: &Value) {
        if let Err(e) = self
            .sink
            .save_step(session_id, label, payload, PERSIST_CATEGORY)
            .await
        {
            warn!(label, error = %e, "failed to persist step");
        }
    }

    async fn persist_failure(&self, session_id: &str, failure: &StageFailure) {
        let label = format!("stage_{}", failure.stage);
        let context = json!({"stage": failure.stage, "code": failure.code});
        if let Err(e) = self
            .sink
            .save_error(session_id, &label, &failure.to_string(), Some(&context))
            .await
        {
            warn!(label, error = %e, "failed to persist stage failure");
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
