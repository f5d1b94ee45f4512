//! Phase execution — the seven phase verbs and `crucible full`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use super::super::Cli;
use crucible::agent::runner::ProcessAgent;
use crucible::audit::{AuditLogger, RunConfig};
use crucible::config::Config;
use crucible::controller::PhaseController;
use crucible::errors::PipelineError;
use crucible::oracle::CheckOracle;
use crucible::phase::PhaseKind;
use crucible::queue::ConstructionRecord;
use crucible::ui::PipelineUi;

/// Everything a pipeline-driving verb needs, built once.
pub(crate) struct Pipeline {
    pub config: Config,
    pub controller: PhaseController,
    pub ui: Arc<PipelineUi>,
    pub audit: AuditLogger,
    /// Held for the lifetime of the run; guarantees one pipeline per project.
    pub _instance_lock: std::fs::File,
}

pub(crate) fn build_pipeline(cli: &Cli, project_dir: PathBuf, command: &str) -> Result<Pipeline> {
    let config = Config::new(project_dir, cli.verbose, cli.agent_cmd.clone())?;
    config.ensure_directories()?;
    let instance_lock = acquire_instance_lock(&config)?;

    let ui = Arc::new(PipelineUi::new(PhaseKind::ALL.len() as u64, cli.verbose));
    let agent = Arc::new(ProcessAgent::new(
        &config.toml.project.agent_cmd,
        &config.project_dir,
        &config.log_dir,
    ));
    let oracle = Arc::new(CheckOracle::new(
        &config.project_dir,
        config.proof_dir(),
        &config.toml.oracle.check_cmd,
        config.toml.oracle.timeout_secs,
    ));
    let controller = PhaseController::new(config.clone(), agent, oracle, Arc::clone(&ui));

    let mut audit = AuditLogger::new(&config.audit_dir);
    audit.start_run(RunConfig {
        command: command.to_string(),
        project_dir: config.project_dir.clone(),
        agent_cmd: config.toml.project.agent_cmd.clone(),
        verbose: cli.verbose,
    })?;

    Ok(Pipeline {
        config,
        controller,
        ui,
        audit,
        _instance_lock: instance_lock,
    })
}

/// Phase execution mutates process-wide lock and resource state, so two
/// pipelines must never run against the same project at once.
fn acquire_instance_lock(config: &Config) -> Result<std::fs::File> {
    use fs2::FileExt;

    let path = config.state_dir.join("pipeline.lock");
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create lock file: {}", path.display()))?;
    file.try_lock_exclusive()
        .context("Another crucible pipeline is already running against this project")?;
    Ok(file)
}

pub(crate) fn load_record(pipeline: &Pipeline, construction: &str) -> Result<ConstructionRecord> {
    let entry = pipeline
        .controller
        .queue()
        .find(construction)?
        .with_context(|| {
            format!(
                "Construction '{}' is not in QUEUE.md; add a row for it first",
                construction
            )
        })?;
    pipeline
        .controller
        .records()
        .ensure(&entry, &pipeline.config.project_dir)
}

/// Run exactly one phase of one construction.
///
/// The verb must name the construction's next phase; anything else is an
/// ordering error.
pub async fn run_single_phase(
    cli: &Cli,
    project_dir: PathBuf,
    phase: PhaseKind,
    construction: &str,
) -> Result<()> {
    let mut pipeline = build_pipeline(cli, project_dir, phase.name())?;
    let mut record = load_record(&pipeline, construction)?;

    if record.status.eligible() && phase != record.next_phase {
        pipeline.audit.finish_run()?;
        return Err(PipelineError::PhaseOrder {
            requested: phase.to_string(),
            expected: record.next_phase.to_string(),
        }
        .into());
    }

    let run = tokio::select! {
        result = pipeline.controller.run_phase(&mut record, &mut pipeline.audit) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    pipeline.audit.finish_run()?;

    match run {
        Some(Ok(_)) => Ok(()),
        Some(Err(err)) => Err(err.into()),
        None => {
            // Dropping the phase future released its locks on the way out.
            anyhow::bail!("Interrupted; phase locks released")
        }
    }
}

/// Run every remaining phase of one construction, through Done.
pub async fn run_full(cli: &Cli, project_dir: PathBuf, construction: &str) -> Result<()> {
    let mut pipeline = build_pipeline(cli, project_dir, "full")?;
    let mut record = load_record(&pipeline, construction)?;

    let run = tokio::select! {
        result = pipeline.controller.run_to_done(&mut record, &mut pipeline.audit) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    pipeline.audit.finish_run()?;

    match run {
        Some(Ok(phases)) => {
            println!("{} done after {} phase(s)", construction, phases);
            Ok(())
        }
        Some(Err(err)) => Err(err.into()),
        None => anyhow::bail!("Interrupted; phase locks released"),
    }
}
