//! Shared types, error model, and configuration for reportforge.
//!
//! This crate is the foundation depended on by all other reportforge crates.
//! It provides:
//! - [`ReportforgeError`], [`StageFailure`], [`FatalPipelineError`]: the error model
//! - Domain types ([`PipelineInput`], [`StageName`], [`FinalAnalysis`], [`SessionId`])
//! - Configuration ([`AppConfig`], [`QualityConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BridgeConfig, PipelineSettings, QualityConfig, StorageConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{FatalPipelineError, ReportforgeError, Result, StageFailure};
pub use types::{
    AnalysisMetadata, AnalysisStatus, ConsolidatedReport, FinalAnalysis, PipelineInput,
    PipelineStatus, QualityReport, SessionId, StageName,
};
