//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use reportforge_core::{
    CollaboratorBridge, Collaborators, Pipeline, ProgressReporter, StorageSink, UuidSessionIssuer,
};
use reportforge_shared::{
    AppConfig, FinalAnalysis, PipelineInput, StageName, init_config, load_config,
};
use reportforge_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// reportforge: market-research reports with quality gates.
#[derive(Parser)]
#[command(
    name = "reportforge",
    version,
    about = "Run market-research report pipelines with validation, recovery, and redaction.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the report pipeline for a project.
    Run {
        /// Project parameters (TOML, or JSON when the extension is .json).
        #[arg(short, long)]
        input: PathBuf,

        /// Session id to correlate journal entries (generated when omitted).
        #[arg(long, env = "REPORTFORGE_SESSION_ID")]
        session_id: Option<String>,

        /// Write the final analysis as JSON to this file.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show journaled runs, or the steps of one session.
    History {
        /// Session to show in detail.
        #[arg(long)]
        session: Option<String>,

        /// Maximum number of sessions listed.
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "reportforge=info",
        1 => "reportforge=debug",
        _ => "reportforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            input,
            session_id,
            out,
        } => cmd_run(&input, session_id, out.as_deref()).await,
        Command::History { session, limit } => cmd_history(session.as_deref(), limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(input_path: &Path, session_id: Option<String>, out: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let input = read_input(input_path)?;

    let db_path = config.storage.resolved_db_path()?;
    let storage = Storage::open(&db_path).await?;

    info!(segment = %input.segment, db = %db_path.display(), "starting run");

    let bridge = Arc::new(CollaboratorBridge::spawn(&config.bridge)?);
    let collaborators = Collaborators {
        search: bridge.clone(),
        inference: bridge.clone(),
        artifacts: bridge.clone(),
        sink: Arc::new(StorageSink::new(storage)),
        sessions: Arc::new(UuidSessionIssuer),
    };
    let pipeline = Pipeline::new(collaborators, &config);

    let progress = CliProgress::new();
    let outcome = pipeline.execute(&input, session_id, &progress).await;
    progress.spinner.finish_and_clear();
    bridge.shutdown();
    let analysis = outcome?;

    match out {
        Some(path) => {
            let json = serde_json::to_string_pretty(&analysis)?;
            std::fs::write(path, json)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            println!("Final analysis written to {}", path.display());
        }
        None => print_summary(&analysis),
    }

    Ok(())
}

/// Parse project parameters from TOML or JSON.
fn read_input(path: &Path) -> Result<PipelineInput> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read input file {}", path.display()))?;
    parse_input(&content, path.extension().and_then(|e| e.to_str()))
}

fn parse_input(content: &str, extension: Option<&str>) -> Result<PipelineInput> {
    let input = match extension {
        Some("json") => serde_json::from_str(content)?,
        _ => toml::from_str(content)?,
    };
    Ok(input)
}

fn print_summary(analysis: &FinalAnalysis) {
    let meta = &analysis.metadata;
    let names = |stages: &[StageName]| {
        if stages.is_empty() {
            "none".to_string()
        } else {
            stages.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        }
    };

    println!();
    println!("✓ Report complete");
    println!("  Session:   {}", meta.session_id);
    println!("  Status:    {:?}", analysis.status);
    println!("  Success:   {:.1}%", meta.success_rate);
    println!("  Quality:   {:.1}/100", meta.quality_score);
    println!("  Failed:    {}", names(&meta.failed_components));
    println!("  Recovered: {}", names(&meta.recovered_sections));
    for issue in &meta.quality_issues {
        println!("  ! {issue}");
    }
    println!("  Time:      {:.1}s", meta.processing_time_seconds);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, index: usize, total: usize, stage: StageName) {
        self.spinner.set_message(format!("[{index}/{total}] {stage}"));
    }

    fn finished(&self, _analysis: &FinalAnalysis) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

async fn cmd_history(session: Option<&str>, limit: usize) -> Result<()> {
    let config = load_config()?;
    let db_path = config.storage.resolved_db_path()?;
    let storage = Storage::open_readonly(&db_path).await?;

    let Some(session) = session else {
        let sessions = storage.list_sessions(limit).await?;
        if sessions.is_empty() {
            println!("No runs journaled yet.");
            return Ok(());
        }
        println!("{:<38} {:<27} {:>6} {:>7}", "SESSION", "STARTED", "STEPS", "ERRORS");
        for s in sessions {
            println!(
                "{:<38} {:<27} {:>6} {:>7}",
                s.session_id, s.started_at, s.step_count, s.error_count
            );
        }
        return Ok(());
    };

    let steps = storage.list_steps(session).await?;
    let errors = storage.list_errors(session).await?;
    if steps.is_empty() && errors.is_empty() {
        return Err(eyre!("no journal entries for session '{session}'"));
    }

    println!("Session {session}");
    println!("\nSteps:");
    for step in &steps {
        println!("  {}  {:<24} {}", step.created_at, step.label, step.category);
    }
    if !errors.is_empty() {
        println!("\nErrors:");
        for err in &errors {
            println!("  {}  {:<24} {}", err.created_at, err.label, err.error);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_input() {
        let input = parse_input(
            r#"
            segment = "Digital Education"
            product = "Online Course"
            price = 497.0
            revenueGoal = 100000.0
            "#,
            Some("toml"),
        )
        .expect("parse toml");
        assert_eq!(input.segment, "Digital Education");
        assert_eq!(input.revenue_goal, Some(100_000.0));
        assert!(input.audience.is_none());
    }

    #[test]
    fn parses_json_input() {
        let input = parse_input(r#"{"segment": "Fintech", "query": "pix adoption"}"#, Some("json"))
            .expect("parse json");
        assert_eq!(input.query.as_deref(), Some("pix adoption"));
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::try_parse_from(["reportforge", "-v", "run", "--input", "project.toml"])
            .expect("parse args");
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Command::Run { .. }));
    }
}
