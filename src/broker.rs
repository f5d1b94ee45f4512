//! Action broker: the single choke point between agent intent and effect.
//!
//! Every action the agent emits is evaluated against the phase policy
//! first, then against the durable lock table, and only then applied to
//! the filesystem or the shell. Denials are receipts, not errors: the
//! iteration keeps going and the denial text is fed back to the agent on
//! the next iteration.

use crate::agent::protocol::AgentEvent;
use crate::errors::PolicyViolation;
use crate::locks::LockManager;
use crate::phase::{PhaseKind, ResourceClass};
use crate::policy::{ActionRequest, PolicyDecision, evaluate};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// What happened to one agent action.
#[derive(Debug, Clone)]
pub enum ActionReceipt {
    Applied {
        summary: String,
    },
    Denied {
        summary: String,
        reason: String,
    },
    Executed {
        summary: String,
        exit_code: i32,
        output: String,
    },
}

impl ActionReceipt {
    pub fn is_denied(&self) -> bool {
        matches!(self, ActionReceipt::Denied { .. })
    }
}

pub struct ActionBroker {
    project_dir: PathBuf,
    locks: LockManager,
    phase: PhaseKind,
    actor: String,
    command_timeout_secs: u64,
}

impl ActionBroker {
    pub fn new(
        project_dir: impl AsRef<Path>,
        locks: LockManager,
        phase: PhaseKind,
        actor: impl Into<String>,
        command_timeout_secs: u64,
    ) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
            locks,
            phase,
            actor: actor.into(),
            command_timeout_secs,
        }
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase
    }

    /// Evaluate one agent event and apply it if the policy allows.
    pub async fn apply(&self, event: &AgentEvent) -> Result<ActionReceipt> {
        match event {
            AgentEvent::CreateResource { path, content } => {
                self.apply_write(ActionRequest::create(&self.actor, path, content), false)
                    .await
            }
            AgentEvent::ModifyResource { path, content } => {
                self.apply_write(ActionRequest::modify(&self.actor, path, content), true)
                    .await
            }
            AgentEvent::ExecuteCommand { command } => {
                let request = ActionRequest::execute(&self.actor, command);
                let summary = format!("execute_command: {}", command);
                match evaluate(self.phase, &request) {
                    PolicyDecision::Deny(violation) => Ok(self.deny(summary, violation)),
                    PolicyDecision::Allow => self.run_command(command, summary).await,
                }
            }
            // signals are handled by the runner, never brokered
            AgentEvent::PhaseComplete
            | AgentEvent::Revision { .. }
            | AgentEvent::Note { .. } => Ok(ActionReceipt::Applied {
                summary: "signal".to_string(),
            }),
        }
    }

    async fn apply_write(
        &self,
        request: ActionRequest,
        overwrite: bool,
    ) -> Result<ActionReceipt> {
        let path = request.targets[0].clone();
        let summary = format!("{}: {}", request.category, path.display());

        if let PolicyDecision::Deny(violation) = evaluate(self.phase, &request) {
            return Ok(self.deny(summary, violation));
        }

        // backstop against the durable table; catches a lock state the
        // static phase rules do not reflect (e.g. after a crash)
        if !self.locks.is_writable(&path)? {
            let class = ResourceClass::classify(&path)
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Ok(self.deny(
                summary,
                PolicyViolation::LockConflict { path, class },
            ));
        }

        let full_path = self.project_dir.join(&path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory for {}", path.display())
            })?;
        }
        if !overwrite && full_path.exists() {
            tracing::debug!(path = %path.display(), "create_resource overwrites existing file");
        }
        std::fs::write(&full_path, &request.payload)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::debug!(path = %path.display(), bytes = request.payload.len(), "Applied write");
        Ok(ActionReceipt::Applied { summary })
    }

    async fn run_command(&self, command: &str, summary: String) -> Result<ActionReceipt> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn command: {}", command))?;

        let timeout_duration = Duration::from_secs(self.command_timeout_secs);
        let (exit_code, output) = match timeout(timeout_duration, child.wait_with_output()).await {
            Ok(result) => {
                let output = result.context("Failed to wait for command")?;
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let combined = format!("{}{}", stdout, stderr).trim().to_string();
                (output.status.code().unwrap_or(-1), combined)
            }
            Err(_) => (
                -1,
                format!("timed out after {} seconds", self.command_timeout_secs),
            ),
        };

        tracing::debug!(command, exit_code, "Executed command");
        Ok(ActionReceipt::Executed {
            summary,
            exit_code,
            output,
        })
    }

    fn deny(&self, summary: String, violation: PolicyViolation) -> ActionReceipt {
        tracing::warn!(phase = %self.phase, action = %summary, %violation, "Action denied");
        ActionReceipt::Denied {
            summary,
            reason: violation.to_string(),
        }
    }
}
