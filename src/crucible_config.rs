//! Persistent pipeline settings.
//!
//! `crucible.toml` lives inside the state directory (`.crucible/`). A
//! missing file means defaults; a malformed file is an error, never a
//! silent fallback.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::phase::PhaseKind;

pub const CONFIG_FILE_NAME: &str = "crucible.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CrucibleToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub oracle: OracleSection,
    /// Per-phase overrides, keyed by phase name
    #[serde(default)]
    pub phases: HashMap<String, PhaseOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSection {
    #[serde(default)]
    pub name: String,
    /// Shell command that runs one reasoning iteration
    #[serde(default = "default_agent_cmd")]
    pub agent_cmd: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            agent_cmd: default_agent_cmd(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsSection {
    /// Iterations per phase before giving up
    #[serde(default = "default_iteration_budget")]
    pub iteration_budget: u32,
    /// Revisions per construction before it is blocked
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    /// Phases advanced per construction within one scheduler cycle
    #[serde(default = "default_cycle_phase_budget")]
    pub cycle_phase_budget: u32,
    /// Timeout for agent-issued shell commands
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            iteration_budget: default_iteration_budget(),
            max_revisions: default_max_revisions(),
            cycle_phase_budget: default_cycle_phase_budget(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleSection {
    /// Verification command, run from the project directory
    #[serde(default = "default_check_cmd")]
    pub check_cmd: String,
    /// Directory scanned for placeholders and forbidden tokens
    #[serde(default = "default_proof_dir")]
    pub proof_dir: String,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            check_cmd: default_check_cmd(),
            proof_dir: default_proof_dir(),
            timeout_secs: default_oracle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PhaseOverride {
    pub iteration_budget: Option<u32>,
}

fn default_agent_cmd() -> String {
    "claude -p".to_string()
}

fn default_iteration_budget() -> u32 {
    5
}

fn default_max_revisions() -> u32 {
    3
}

fn default_cycle_phase_budget() -> u32 {
    7
}

fn default_command_timeout() -> u64 {
    300
}

fn default_check_cmd() -> String {
    "lake build".to_string()
}

fn default_proof_dir() -> String {
    "proofs".to_string()
}

fn default_oracle_timeout() -> u64 {
    600
}

impl CrucibleToml {
    pub fn config_path(state_dir: &Path) -> PathBuf {
        state_dir.join(CONFIG_FILE_NAME)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let path = Self::config_path(state_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn save(&self, state_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(state_dir).with_context(|| {
            format!("Failed to create state directory: {}", state_dir.display())
        })?;
        let path = Self::config_path(state_dir);
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(path)
    }

    /// Iteration budget for a phase, honoring `[phases.<name>]` overrides.
    pub fn budget_for(&self, phase: PhaseKind) -> u32 {
        self.phases
            .get(phase.name())
            .and_then(|p| p.iteration_budget)
            .unwrap_or(self.defaults.iteration_budget)
    }
}
