use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

mod cmd;

#[derive(Parser)]
#[command(name = "crucible")]
#[command(version, about = "Phase-locked proof pipeline orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip interactive confirmations
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Command used to invoke the reasoning agent; overrides crucible.toml
    #[arg(long, global = true)]
    pub agent_cmd: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scaffold QUEUE.md and the .crucible/ state directory
    Init,
    /// Survey prior art for a construction
    Survey { construction: String },
    /// Write the formal specification artifact
    Specify { construction: String },
    /// Build the mathematical construction documents
    Construct { construction: String },
    /// Formalize statements with placeholder proofs
    Formalize { construction: String },
    /// Replace placeholders with real proofs
    Prove { construction: String },
    /// Audit the proof artifacts against the verification oracle
    Audit { construction: String },
    /// Write the journal entry and archive the construction
    Log { construction: String },
    /// Run every remaining phase of a construction, through Done
    Full { construction: String },
    /// Work the whole queue unattended
    Program {
        /// Maximum scheduler cycles before stopping
        #[arg(long, default_value = "10")]
        max_cycles: u32,
    },
    /// Inspect queue, locks, and proof artifacts without side effects
    Status {
        construction: Option<String>,
    },
    /// Acknowledge a blocked construction
    Acknowledge { construction: String },
    /// Reset a blocked construction's revision budget and resume it
    Reopen { construction: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    // Keep the non-blocking log writer alive for the whole run.
    let _log_guard = init_tracing(&project_dir, cli.verbose);

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Survey { construction } => {
            cmd::run_single_phase(&cli, project_dir, crucible::phase::PhaseKind::Survey, construction)
                .await?
        }
        Commands::Specify { construction } => {
            cmd::run_single_phase(&cli, project_dir, crucible::phase::PhaseKind::Specify, construction)
                .await?
        }
        Commands::Construct { construction } => {
            cmd::run_single_phase(
                &cli,
                project_dir,
                crucible::phase::PhaseKind::Construct,
                construction,
            )
            .await?
        }
        Commands::Formalize { construction } => {
            cmd::run_single_phase(
                &cli,
                project_dir,
                crucible::phase::PhaseKind::Formalize,
                construction,
            )
            .await?
        }
        Commands::Prove { construction } => {
            cmd::run_single_phase(&cli, project_dir, crucible::phase::PhaseKind::Prove, construction)
                .await?
        }
        Commands::Audit { construction } => {
            cmd::run_single_phase(&cli, project_dir, crucible::phase::PhaseKind::Audit, construction)
                .await?
        }
        Commands::Log { construction } => {
            cmd::run_single_phase(&cli, project_dir, crucible::phase::PhaseKind::Log, construction)
                .await?
        }
        Commands::Full { construction } => {
            cmd::run_full(&cli, project_dir, construction).await?
        }
        Commands::Program { max_cycles } => {
            cmd::cmd_program(&cli, project_dir, *max_cycles).await?
        }
        Commands::Status { construction } => {
            cmd::cmd_status(&project_dir, construction.as_deref())?
        }
        Commands::Acknowledge { construction } => {
            cmd::cmd_acknowledge(&project_dir, construction)?
        }
        Commands::Reopen { construction } => {
            cmd::cmd_reopen(&project_dir, construction, cli.yes)?
        }
    }

    Ok(())
}

/// Structured logs go to `.crucible/logs/crucible.log` as JSON lines once
/// the project is initialized; `--verbose` mirrors them to stderr. The
/// progress UI owns stdout either way.
fn init_tracing(
    project_dir: &std::path::Path,
    verbose: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "crucible=info".into());

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
    });

    let log_dir = project_dir.join(".crucible/logs");
    if log_dir.exists() {
        let appender = tracing_appender::rolling::never(&log_dir, "crucible.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        None
    }
}
