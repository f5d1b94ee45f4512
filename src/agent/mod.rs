//! Reasoning agent integration.
//!
//! The pipeline drives an external reasoning process one iteration at a
//! time. Each iteration gets a prompt describing the phase objective and
//! rules, and streams back events that the broker applies under policy.

pub mod protocol;
pub mod runner;

use crate::broker::ActionBroker;
use crate::phase::PhaseKind;
use anyhow::Result;
use async_trait::async_trait;
use protocol::PhaseSignal;
use std::path::PathBuf;

/// Everything one iteration needs to know.
#[derive(Debug, Clone)]
pub struct IterationContext {
    pub construction: String,
    /// Path of the specification artifact, relative to the project dir
    pub spec_ref: String,
    pub phase: PhaseKind,
    pub iteration: u32,
    /// Denials and failures from the previous iteration
    pub feedback: Vec<String>,
}

/// What one iteration produced.
#[derive(Debug, Default)]
pub struct IterationOutcome {
    pub signal: Option<PhaseSignal>,
    pub applied: u32,
    pub denied: Vec<String>,
    pub failed_commands: Vec<String>,
    pub output_file: Option<PathBuf>,
}

impl IterationOutcome {
    /// Lines carried into the next iteration's prompt.
    pub fn feedback(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for denial in &self.denied {
            lines.push(format!("rejected: {}", denial));
        }
        for failure in &self.failed_commands {
            lines.push(format!("failed: {}", failure));
        }
        lines
    }
}

#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    /// Run one iteration of the given phase, routing every action through
    /// the broker. Returning no signal spends one unit of budget.
    async fn run_iteration(
        &self,
        ctx: &IterationContext,
        broker: &ActionBroker,
    ) -> Result<IterationOutcome>;
}

impl IterationContext {
    pub fn new(
        construction: impl Into<String>,
        spec_ref: impl Into<String>,
        phase: PhaseKind,
        iteration: u32,
        feedback: Vec<String>,
    ) -> Self {
        Self {
            construction: construction.into(),
            spec_ref: spec_ref.into(),
            phase,
            iteration,
            feedback,
        }
    }
}
