//! Error types for reportforge.
//!
//! Library crates use [`ReportforgeError`] via `thiserror`. The pipeline adds
//! two narrower types: [`StageFailure`] flows through normal control inside a
//! run, [`FatalPipelineError`] is the only thing that aborts one.
//! App crates (cli) wrap these with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::StageName;

/// Top-level error type for all reportforge operations.
#[derive(Debug, thiserror::Error)]
pub enum ReportforgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Collaborator bridge subprocess error (spawn, protocol, or I/O).
    #[error("bridge error: {0}")]
    Bridge(String),

    /// An external collaborator (search, inference, generator) failed.
    #[error("{name} failed: {message}")]
    Collaborator { name: String, message: String },

    /// Structured data could not be parsed (AI responses, input files).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A pipeline run aborted on an unrecoverable mandatory stage.
    #[error(transparent)]
    Fatal(#[from] FatalPipelineError),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReportforgeError>;

impl ReportforgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a collaborator error tagged with the collaborator's name.
    pub fn collaborator(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Collaborator {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage-level failure
// ---------------------------------------------------------------------------

/// A named stage could not produce valid output.
///
/// Carries the stage's failure code (e.g. `WEB_SEARCH_FAILED`) so that log
/// lines and persisted error records can be grepped per stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {cause}")]
pub struct StageFailure {
    pub stage: StageName,
    pub code: &'static str,
    pub cause: String,
}

impl StageFailure {
    pub fn new(stage: StageName, cause: impl Into<String>) -> Self {
        Self {
            stage,
            code: stage.failure_code(),
            cause: cause.into(),
        }
    }

    /// Validator rejection: the value came back but did not pass the gate.
    pub fn rejected(stage: StageName, reasons: &[String]) -> Self {
        Self::new(stage, format!("rejected by validator: {}", reasons.join("; ")))
    }
}

// ---------------------------------------------------------------------------
// Run-level fatal failure
// ---------------------------------------------------------------------------

/// The only error a pipeline run surfaces to its caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FatalPipelineError {
    /// A mandatory stage failed and recovery could not supply a value.
    #[error("mandatory stage '{stage}' failed and could not be recovered: {cause}")]
    MandatoryStageFailed { stage: StageName, cause: String },

    /// Mandatory stages were absent after the stage loop.
    #[error("mandatory stages missing after execution: {}", join_names(.stages))]
    MandatoryStagesMissing { stages: Vec<StageName> },
}

fn join_names(stages: &[StageName]) -> String {
    stages
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
