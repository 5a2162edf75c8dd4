//! Core pipeline orchestration and domain logic for reportforge.
//!
//! This crate ties the stage functions, the quality gates, recovery, and
//! redaction together into one end-to-end report run ([`Pipeline::execute`]).
//! External work (search, model calls, artifact generation, persistence) is
//! reached only through the traits in [`collaborators`].

pub mod ai_response;
pub mod bridge;
pub mod collaborators;
pub mod persist;
pub mod pipeline;
pub mod prompt;
pub mod recovery;
pub mod redact;
pub mod search;
pub mod stages;

#[cfg(test)]
mod testing;

pub use bridge::CollaboratorBridge;
pub use collaborators::{
    ArtifactGenerator, Collaborators, InferenceProvider, NoopSink, SearchHit, SearchOptions,
    SearchProvider, SearchResponse, SearchStatistics, SessionIssuer, StepSink, UuidSessionIssuer,
};
pub use persist::StorageSink;
pub use pipeline::{PERSIST_CATEGORY, Pipeline, ProgressReporter, SilentProgress};
pub use recovery::RecoveryGenerator;
pub use redact::redact;
pub use stages::{Stage, standard_stages};
