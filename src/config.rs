use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::crucible_config::CrucibleToml;

/// Runtime configuration.
///
/// Derives every pipeline path from the project directory and layers CLI
/// flags over the values in `crucible.toml`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub queue_file: PathBuf,
    pub state_dir: PathBuf,
    pub records_dir: PathBuf,
    pub locks_file: PathBuf,
    pub revisions_dir: PathBuf,
    pub results_dir: PathBuf,
    pub log_dir: PathBuf,
    pub audit_dir: PathBuf,
    pub verbose: bool,
    pub toml: CrucibleToml,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool, agent_cmd: Option<String>) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        let state_dir = project_dir.join(".crucible");
        let mut toml = CrucibleToml::load_or_default(&state_dir)?;
        if let Some(cmd) = agent_cmd {
            toml.project.agent_cmd = cmd;
        }

        Ok(Self {
            queue_file: project_dir.join("QUEUE.md"),
            records_dir: state_dir.join("state/constructions"),
            locks_file: state_dir.join("locks.json"),
            revisions_dir: state_dir.join("revisions"),
            results_dir: state_dir.join("results"),
            log_dir: state_dir.join("logs"),
            audit_dir: state_dir.join("audit"),
            state_dir,
            project_dir,
            verbose,
            toml,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.records_dir)
            .context("Failed to create records directory")?;
        std::fs::create_dir_all(&self.revisions_dir)
            .context("Failed to create revisions directory")?;
        std::fs::create_dir_all(&self.results_dir)
            .context("Failed to create results directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        std::fs::create_dir_all(self.audit_dir.join("runs"))
            .context("Failed to create audit runs directory")?;
        Ok(())
    }

    /// Absolute path of the proof directory the oracle scans.
    pub fn proof_dir(&self) -> PathBuf {
        self.project_dir.join(&self.toml.oracle.proof_dir)
    }
}
