use crate::phase::PhaseKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// One pipeline-driving command invocation, with every phase it ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAudit {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub config: RunConfig,
    pub phases: Vec<PhaseAudit>,
}

impl RunAudit {
    pub fn new(config: RunConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            config,
            phases: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }
}

/// Echo of how the run was configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub command: String,
    pub project_dir: PathBuf,
    pub agent_cmd: String,
    pub verbose: bool,
}

/// One phase execution for one construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseAudit {
    pub construction: String,
    pub phase: PhaseKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub iterations: Vec<IterationAudit>,
    pub outcome: PhaseOutcome,
}

impl PhaseAudit {
    pub fn new(construction: &str, phase: PhaseKind) -> Self {
        Self {
            construction: construction.to_string(),
            phase,
            started_at: Utc::now(),
            ended_at: None,
            iterations: Vec::new(),
            outcome: PhaseOutcome::InProgress,
        }
    }

    pub fn finish(&mut self, outcome: PhaseOutcome) {
        self.ended_at = Some(Utc::now());
        self.outcome = outcome;
    }

    pub fn denial_count(&self) -> usize {
        self.iterations.iter().map(|i| i.denials.len()).sum()
    }
}

/// One agent iteration inside a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationAudit {
    pub iteration: u32,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub applied_actions: u32,
    /// Policy denials, verbatim; never discarded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denials: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_commands: Vec<String>,
    /// What the iteration signalled, if anything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PhaseOutcome {
    InProgress,
    Completed { iteration: u32 },
    BudgetExhausted,
    VerificationFailed { detail: String },
    Revised { restart_from: PhaseKind },
    Blocked { reason: String },
    Error { message: String },
}

pub mod logger;
pub use logger::AuditLogger;
