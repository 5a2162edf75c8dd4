//! In-memory collaborators and fixtures for unit tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use reportforge_shared::{FinalAnalysis, ReportforgeError, Result, StageFailure, StageName};

use crate::collaborators::{
    ArtifactGenerator, Collaborators, InferenceProvider, SearchHit, SearchOptions,
    SearchProvider, SearchResponse, SearchStatistics, SessionIssuer, StepSink,
};
use crate::pipeline::ProgressReporter;
use crate::stages::Stage;

pub fn map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

pub fn collaborators(
    search: FakeSearch,
    inference: FakeInference,
    artifacts: FakeArtifacts,
    sink: Arc<dyn StepSink>,
) -> Collaborators {
    Collaborators {
        search: Arc::new(search),
        inference: Arc::new(inference),
        artifacts: Arc::new(artifacts),
        sink,
        sessions: Arc::new(FixedSession("fixed-session".into())),
    }
}

/// A rich, authentic-looking analysis document.
pub fn good_analysis() -> Value {
    let insights: Vec<String> = [
        "Working adults prefer course modules shorter than twenty minutes that fit a commute",
        "Completion rates double when learners receive a weekly live session with an instructor",
        "Most buyers discover online courses through recommendations inside professional groups",
        "Certificates recognised by employers are the strongest purchase trigger for this audience",
        "Installment payment options lift conversion among buyers earning under ten thousand a month",
        "Refund requests cluster in the first week, when onboarding is weakest",
        "Competitors rarely show student results with numbers, leaving room for proof-led messaging",
        "Search interest for upskilling courses peaks in January and again in early July",
        "Learners who join a cohort community are three times more likely to buy a second course",
        "Mobile viewing accounts for the majority of lesson minutes across the segment",
        "Short free lessons convert better than long webinars for cold traffic from social media",
        "Corporate reimbursement is available to a large share of the audience but rarely promoted",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    json!({
        "avatar": {
            "fictionalName": "Marina Costa",
            "demographicProfile": {
                "age": "32-42",
                "gender": "female majority",
                "income": "R$ 8k-15k per month",
                "education": "bachelor's degree",
                "location": "São Paulo and Belo Horizonte",
                "occupation": "mid-level corporate analyst"
            },
            "painPoints": [
                "Feels her career stalled after five years in the same analyst role",
                "Cannot find evening hours to study after long workdays and commuting",
                "Bought two courses before and abandoned both halfway through",
                "Worries that her skills are losing relevance as her company automates",
                "Struggles to prove new skills to managers who only value certificates"
            ],
            "desires": [
                "A promotion to coordinator within the next eighteen months",
                "Learning that fits into a thirty-minute daily window",
                "Recognition from leadership for bringing new methods to the team",
                "A certificate that recruiters actually search for",
                "Confidence to negotiate a higher salary"
            ],
            "objections": [
                "I have already wasted money on courses I never finished",
                "I do not have time with my current workload",
                "My company might not recognise this certificate"
            ]
        },
        "positioning": {
            "marketPositioning": "The practical course for busy professionals who need promotable skills fast",
            "uniqueValueProposition": "Finish in six weeks with twenty-minute lessons and a certificate employers recognise",
            "competitiveDifferentiators": ["weekly live mentoring", "employer-recognised certificate"],
            "coreMessage": "Grow your career in twenty minutes a day"
        },
        "competitorAnalysis": [
            {"name": "Alura", "strengths": ["large catalogue"], "weaknesses": ["little mentoring"]},
            {"name": "Udemy", "strengths": ["low prices"], "weaknesses": ["uneven quality"]}
        ],
        "insights": insights
    })
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Search fake: the first `qualifying` calls return two quality hits each.
pub struct FakeSearch {
    qualifying: usize,
    fail: bool,
    basic_hits: usize,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn qualifying(qualifying: usize) -> Self {
        Self {
            qualifying,
            fail: false,
            basic_hits: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::qualifying(0)
        }
    }

    pub fn with_basic_hits(mut self, hits: usize) -> Self {
        self.basic_hits = hits;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn fake_hit(n: usize, j: usize) -> SearchHit {
    let mut extra = Map::new();
    extra.insert(
        "content".into(),
        Value::from(format!(
            "Page {n}-{j}: figures based on a generic industry survey of online learners"
        )),
    );
    SearchHit {
        title: format!("Market report {n}-{j}"),
        url: format!("https://source{n}-{j}.example/report"),
        source: "web".into(),
        quality_score: 80.0,
        extra,
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(
        &self,
        _query: &str,
        _context: &Map<String, Value>,
        _options: SearchOptions,
    ) -> Result<SearchResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ReportforgeError::collaborator("search", "connection refused"));
        }
        let meets = n < self.qualifying;
        Ok(SearchResponse {
            meets_quality_requirements: meets,
            search_results: if meets {
                vec![fake_hit(n, 0), fake_hit(n, 1)]
            } else {
                Vec::new()
            },
            statistics: SearchStatistics {
                successful_extractions: if meets { 2 } else { 0 },
                total_content_length: if meets { 4000 } else { 0 },
                avg_quality_score: if meets { 80.0 } else { 0.0 },
            },
        })
    }

    async fn search_basic(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        Ok((0..self.basic_hits.min(limit))
            .map(|j| fake_hit(99, j))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

pub enum FakeInference {
    Text(String),
    Failing,
}

impl FakeInference {
    /// Fenced JSON of [`good_analysis`].
    pub fn good() -> Self {
        Self::json(&good_analysis())
    }

    pub fn json(value: &Value) -> Self {
        Self::Text(format!("Here is the analysis.\n```json\n{value:#}\n```"))
    }

    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

#[async_trait]
impl InferenceProvider for FakeInference {
    async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Failing => Err(ReportforgeError::collaborator("inference", "model unavailable")),
        }
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ArtifactMode {
    #[default]
    Good,
    Fallback,
    Emergency,
}

#[derive(Default)]
pub struct FakeArtifacts {
    mode: ArtifactMode,
    objections: Mutex<Vec<String>>,
}

impl FakeArtifacts {
    pub fn fallback() -> Self {
        Self {
            mode: ArtifactMode::Fallback,
            ..Default::default()
        }
    }

    pub fn emergency() -> Self {
        Self {
            mode: ArtifactMode::Emergency,
            ..Default::default()
        }
    }

    /// Objections passed to the most recent `anti_objection` call.
    pub fn last_objections(&self) -> Vec<String> {
        self.objections.lock().map(|o| o.clone()).unwrap_or_default()
    }

    fn fallback_mode(&self) -> bool {
        self.mode == ArtifactMode::Fallback
    }
}

fn driver(name: &str, story: &str) -> Value {
    json!({
        "name": name,
        "trigger": format!("{name} trigger"),
        "activationScript": {"story": story}
    })
}

#[async_trait]
impl ArtifactGenerator for FakeArtifacts {
    async fn mental_drivers(&self, _avatar: &Value, _context: &Map<String, Value>) -> Result<Value> {
        let drivers = vec![
            driver(
                "Urgency",
                "Marina watched a younger colleague take the coordinator role she had waited three years for, and decided that this quarter would be different.",
            ),
            driver(
                "Proof",
                "When Carla showed her manager the dashboard she built during week four of the course, the conversation shifted from budget cuts to her next project.",
            ),
            driver(
                "Belonging",
                "Every Thursday night forty analysts from across the country meet online, compare progress, and hold each other to the weekly lesson plan.",
            ),
        ];
        let mut value = json!({"drivers": drivers});
        if self.fallback_mode() {
            value["fallbackMode"] = json!(true);
        }
        Ok(value)
    }

    async fn visual_proofs(
        &self,
        concepts: &[String],
        _avatar: &Value,
        _context: &Map<String, Value>,
    ) -> Result<Value> {
        let mut proofs: Vec<Value> = concepts
            .iter()
            .take(3)
            .map(|c| json!({"concept": c, "title": format!("Demonstration of {c}"), "content": "Step by step demonstration script"}))
            .collect();
        if self.fallback_mode() {
            proofs.push(json!({"fallbackMode": true}));
        }
        Ok(Value::Array(proofs))
    }

    async fn anti_objection(
        &self,
        objections: &[String],
        _avatar: &Value,
        _context: &Map<String, Value>,
    ) -> Result<Value> {
        if let Ok(mut last) = self.objections.lock() {
            *last = objections.to_vec();
        }
        let scripts: Vec<Value> = objections
            .iter()
            .map(|o| json!({"objection": o, "response": "Show the six-week completion data and the guarantee"}))
            .collect();
        let mut value = json!({"scripts": scripts});
        if self.fallback_mode() {
            value["fallbackMode"] = json!(true);
        }
        Ok(value)
    }

    async fn pre_pitch(
        &self,
        _drivers: &Value,
        _avatar: &Value,
        _context: &Map<String, Value>,
    ) -> Result<Value> {
        if self.mode == ArtifactMode::Emergency {
            return Ok(json!({"status": "EMERGENCY_MODE"}));
        }
        Ok(json!({
            "sequence": ["Open with the stalled-career story", "Reveal the six-week path"],
            "status": "READY"
        }))
    }

    async fn future_predictions(
        &self,
        segment: &str,
        _context: &Map<String, Value>,
        horizon_months: u32,
    ) -> Result<Value> {
        Ok(json!({
            "segment": segment,
            "horizonMonths": horizon_months,
            "scenarios": ["steady growth of corporate upskilling budgets"]
        }))
    }
}

// ---------------------------------------------------------------------------
// Sinks, sessions, progress, stages
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    steps: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn step_labels(&self) -> Vec<String> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn error_labels(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StepSink for RecordingSink {
    async fn save_step(&self, _session: &str, label: &str, _payload: &Value, _category: &str) -> Result<()> {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push(label.to_string());
        }
        Ok(())
    }

    async fn save_error(&self, _session: &str, label: &str, _error: &str, _context: Option<&Value>) -> Result<()> {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(label.to_string());
        }
        Ok(())
    }
}

pub struct FailingSink;

#[async_trait]
impl StepSink for FailingSink {
    async fn save_step(&self, _: &str, _: &str, _: &Value, _: &str) -> Result<()> {
        Err(ReportforgeError::Storage("disk full".into()))
    }

    async fn save_error(&self, _: &str, _: &str, _: &str, _: Option<&Value>) -> Result<()> {
        Err(ReportforgeError::Storage("disk full".into()))
    }
}

pub struct FixedSession(pub String);

impl SessionIssuer for FixedSession {
    fn issue(&self) -> String {
        self.0.clone()
    }
}

#[derive(Default)]
pub struct CountingProgress {
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl CountingProgress {
    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl ProgressReporter for CountingProgress {
    fn stage_started(&self, _index: usize, _total: usize, _stage: StageName) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn finished(&self, _analysis: &FinalAnalysis) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// A stage that always fails.
pub struct FailingStage(pub StageName);

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> StageName {
        self.0
    }

    async fn run(&self, _data: &Map<String, Value>, _session_id: &str) -> std::result::Result<Value, StageFailure> {
        Err(StageFailure::new(self.0, "collaborator unavailable"))
    }
}
