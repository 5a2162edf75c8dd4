//! Quality gates for reportforge stage output.
//!
//! Pure functions only: no I/O, no collaborators. The pipeline calls
//! [`StageValidator`] after every stage and [`score_final_analysis`] once
//! per run on the consolidated report.

pub mod authenticity;
pub mod scoring;
pub mod validator;

pub use authenticity::{
    EMERGENCY_STATUS, FALLBACK_MARKER, RECOVERED_STAGE_KEY, contains_denylisted_phrase,
    count_simulation_markers, is_emergency, is_empty_value, is_fallback, looks_templated,
};
pub use scoring::{avatar_depth_score, score_final_analysis, source_count};
pub use validator::StageValidator;
