//! Wire protocol between the pipeline and the reasoning agent.
//!
//! The agent emits one JSON object per stdout line. Anything that does
//! not parse as an event is kept as transcript text.

use crate::phase::PhaseKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One line of agent output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    CreateResource {
        path: PathBuf,
        content: String,
    },
    ModifyResource {
        path: PathBuf,
        content: String,
    },
    ExecuteCommand {
        command: String,
    },
    /// Claim that the phase objective is met
    PhaseComplete,
    /// Claim that an earlier phase produced a flawed artifact
    Revision {
        description: String,
        evidence: String,
        restart_from: PhaseKind,
    },
    Note {
        text: String,
    },
}

/// A revision claim, validated and acted on by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevisionRequest {
    pub description: String,
    pub evidence: String,
    pub restart_from: PhaseKind,
}

/// Terminal signal of one iteration. Absence means the budget keeps
/// counting down.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseSignal {
    Complete,
    Revision(RevisionRequest),
}
