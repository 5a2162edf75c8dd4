//! Application configuration for reportforge.
//!
//! User config lives at `~/.reportforge/reportforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReportforgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "reportforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".reportforge";

// ---------------------------------------------------------------------------
// Config structs (matching reportforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Quality thresholds.
    #[serde(default)]
    pub quality: QualityConfig,

    /// Stage execution settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Collaborator bridge subprocess.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Step journal location.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[quality]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Sources a report needs for the full source score.
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,

    /// Minimum insight count for the insights stage and for scoring.
    #[serde(default = "default_min_insights")]
    pub min_insights: usize,

    /// Final insight lists are truncated to this many entries.
    #[serde(default = "default_max_insights")]
    pub max_insights: usize,

    /// Insights shorter than this are discarded.
    #[serde(default = "default_min_insight_length")]
    pub min_insight_length: usize,

    /// Score at or above which a report counts as quality-guaranteed.
    #[serde(default = "default_min_quality_score")]
    pub min_quality_score: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_sources: default_min_sources(),
            min_insights: default_min_insights(),
            max_insights: default_max_insights(),
            min_insight_length: default_min_insight_length(),
            min_quality_score: default_min_quality_score(),
        }
    }
}

fn default_min_sources() -> usize {
    3
}
fn default_min_insights() -> usize {
    10
}
fn default_max_insights() -> usize {
    25
}
fn default_min_insight_length() -> usize {
    50
}
fn default_min_quality_score() -> f64 {
    95.0
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Queries actually sent to the search collaborator per run.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    /// Upper bound on generated queries.
    #[serde(default = "default_max_generated_queries")]
    pub max_generated_queries: usize,

    #[serde(default = "default_max_results_per_query")]
    pub max_results_per_query: usize,

    #[serde(default = "default_true")]
    pub require_high_quality: bool,

    /// Result limit for the secondary search fallback.
    #[serde(default = "default_secondary_search_limit")]
    pub secondary_search_limit: usize,

    /// Token budget for the AI analysis call.
    #[serde(default = "default_ai_max_tokens")]
    pub ai_max_tokens: u32,

    #[serde(default = "default_prediction_horizon_months")]
    pub prediction_horizon_months: u32,

    /// Version string stamped into report metadata.
    #[serde(default = "default_pipeline_version")]
    pub pipeline_version: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_queries: default_max_queries(),
            max_generated_queries: default_max_generated_queries(),
            max_results_per_query: default_max_results_per_query(),
            require_high_quality: true,
            secondary_search_limit: default_secondary_search_limit(),
            ai_max_tokens: default_ai_max_tokens(),
            prediction_horizon_months: default_prediction_horizon_months(),
            pipeline_version: default_pipeline_version(),
        }
    }
}

fn default_max_queries() -> usize {
    5
}
fn default_max_generated_queries() -> usize {
    12
}
fn default_max_results_per_query() -> usize {
    20
}
fn default_true() -> bool {
    true
}
fn default_secondary_search_limit() -> usize {
    10
}
fn default_ai_max_tokens() -> u32 {
    8192
}
fn default_prediction_horizon_months() -> u32 {
    36
}
fn default_pipeline_version() -> String {
    "2.0_enhanced".into()
}

/// `[bridge]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge command (e.g., "bun").
    #[serde(default = "default_bridge_command")]
    pub command: String,

    /// Script passed to the command.
    #[serde(default = "default_bridge_script")]
    pub script: String,

    /// Working directory for the bridge subprocess.
    #[serde(default = "default_bridge_working_dir")]
    pub working_dir: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: default_bridge_command(),
            script: default_bridge_script(),
            working_dir: default_bridge_working_dir(),
        }
    }
}

fn default_bridge_command() -> String {
    "bun".into()
}
fn default_bridge_script() -> String {
    "bridge/collaborators.ts".into()
}
fn default_bridge_working_dir() -> String {
    ".".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Step journal database path. A leading `~/` expands to the home dir.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.reportforge/steps.db".into()
}

impl StorageConfig {
    /// Resolve `db_path`, expanding a leading `~/`.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        match self.db_path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    ReportforgeError::config("could not determine home directory")
                })?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.db_path)),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.reportforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ReportforgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.reportforge/reportforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ReportforgeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ReportforgeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject threshold combinations the pipeline cannot honour.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let q = &config.quality;
    if q.max_insights < q.min_insights {
        return Err(ReportforgeError::config(format!(
            "quality.max_insights ({}) is below quality.min_insights ({})",
            q.max_insights, q.min_insights
        )));
    }
    if !(0.0..=100.0).contains(&q.min_quality_score) {
        return Err(ReportforgeError::config(format!(
            "quality.min_quality_score must be within 0..=100, got {}",
            q.min_quality_score
        )));
    }
    if config.pipeline.max_queries == 0 {
        return Err(ReportforgeError::config("pipeline.max_queries must be at least 1"));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ReportforgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ReportforgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ReportforgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
