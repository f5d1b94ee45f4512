//! Typed error hierarchy for the Crucible pipeline.
//!
//! Two top-level enums cover the two subsystems:
//! - `PolicyViolation` — action denials from the policy engine
//! - `PipelineError` — construction-level failures from the controller
//!   and scheduler

use thiserror::Error;

/// Denial reasons produced by the action policy engine.
///
/// Every denial is reported back to the requesting actor with its Display
/// rendering as the reason string; none are silently discarded.
#[derive(Debug, Error)]
pub enum PolicyViolation {
    #[error("Forbidden token '{token}' detected")]
    ForbiddenToken { token: String },

    #[error("Path {path} escapes the project directory")]
    PathEscape { path: std::path::PathBuf },

    #[error("Write to {path} denied: {class} resources are locked during this phase")]
    LockConflict {
        path: std::path::PathBuf,
        class: String,
    },

    #[error("{category} actions are not permitted during the {phase} phase")]
    CategoryNotAllowed { category: String, phase: String },

    #[error("Content rule violated: {detail}")]
    ContentRule { detail: String },

    #[error("Destructive command pattern '{pattern}' detected")]
    DestructiveCommand { pattern: String },
}

/// Errors that abort or suspend automatic progress for a construction.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error("Verification failed: {detail}")]
    VerificationFailure { detail: String },

    #[error("Construction '{construction}' exhausted its revision budget ({limit})")]
    RevisionExhausted { construction: String, limit: u32 },

    #[error("Phase {phase} requires {path}, which does not exist")]
    MissingArtifact {
        phase: String,
        path: std::path::PathBuf,
    },

    #[error("Budget exhausted after {iterations} iterations without completion signal in phase {phase}")]
    BudgetExhausted { phase: String, iterations: u32 },

    #[error("Phase {requested} requested but the next phase for this construction is {expected}")]
    PhaseOrder { requested: String, expected: String },

    #[error("Construction '{construction}' is already done")]
    AlreadyDone { construction: String },

    #[error("Construction '{construction}' is blocked pending manual intervention")]
    Blocked { construction: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
