//! Contracts for the external collaborators a pipeline run depends on.
//!
//! The pipeline never fetches pages, calls a model, or writes to disk
//! itself. It holds these traits behind `Arc<dyn ..>` and applies its
//! policy to whatever they return.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use reportforge_shared::{Result, SessionId};

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// One search hit. Fields beyond the common ones (raw content, extraction
/// details) are carried in `extra` and later removed by redaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub quality_score: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Aggregate numbers the search collaborator reports per query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStatistics {
    #[serde(default)]
    pub successful_extractions: u64,
    #[serde(default)]
    pub total_content_length: u64,
    #[serde(default)]
    pub avg_quality_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub meets_quality_requirements: bool,
    #[serde(default)]
    pub search_results: Vec<SearchHit>,
    #[serde(default)]
    pub statistics: SearchStatistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    pub max_results: usize,
    pub require_high_quality: bool,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Full search with content extraction for one query.
    async fn search(
        &self,
        query: &str,
        context: &Map<String, Value>,
        options: SearchOptions,
    ) -> Result<SearchResponse>;

    /// Cheap title/URL-only search, used when `search` yields nothing usable.
    async fn search_basic(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Raw model output, usually a fenced JSON document.
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Derived artifacts
// ---------------------------------------------------------------------------

/// Generators for the marketing artifacts derived from the avatar.
///
/// A degraded result is signalled in-band with `fallbackMode: true` or
/// `status: "EMERGENCY_MODE"`; the pipeline rejects both.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn mental_drivers(&self, avatar: &Value, context: &Map<String, Value>) -> Result<Value>;

    async fn visual_proofs(
        &self,
        concepts: &[String],
        avatar: &Value,
        context: &Map<String, Value>,
    ) -> Result<Value>;

    async fn anti_objection(
        &self,
        objections: &[String],
        avatar: &Value,
        context: &Map<String, Value>,
    ) -> Result<Value>;

    async fn pre_pitch(
        &self,
        drivers: &Value,
        avatar: &Value,
        context: &Map<String, Value>,
    ) -> Result<Value>;

    async fn future_predictions(
        &self,
        segment: &str,
        context: &Map<String, Value>,
        horizon_months: u32,
    ) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Fire-and-forget durability hooks. Errors are logged by the caller and
/// never abort a run.
#[async_trait]
pub trait StepSink: Send + Sync {
    async fn save_step(
        &self,
        session_id: &str,
        label: &str,
        payload: &Value,
        category: &str,
    ) -> Result<()>;

    async fn save_error(
        &self,
        session_id: &str,
        label: &str,
        error: &str,
        context: Option<&Value>,
    ) -> Result<()>;
}

/// Sink that discards everything.
pub struct NoopSink;

#[async_trait]
impl StepSink for NoopSink {
    async fn save_step(&self, _: &str, _: &str, _: &Value, _: &str) -> Result<()> {
        Ok(())
    }

    async fn save_error(&self, _: &str, _: &str, _: &str, _: Option<&Value>) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session ids
// ---------------------------------------------------------------------------

pub trait SessionIssuer: Send + Sync {
    fn issue(&self) -> String;
}

/// Issues UUID v7 session ids.
pub struct UuidSessionIssuer;

impl SessionIssuer for UuidSessionIssuer {
    fn issue(&self) -> String {
        SessionId::new().to_string()
    }
}

/// Everything a standard pipeline needs, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn SearchProvider>,
    pub inference: Arc<dyn InferenceProvider>,
    pub artifacts: Arc<dyn ArtifactGenerator>,
    pub sink: Arc<dyn StepSink>,
    pub sessions: Arc<dyn SessionIssuer>,
}
