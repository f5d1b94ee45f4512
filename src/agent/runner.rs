//! Process-backed reasoning agent.
//!
//! Spawns the configured agent command once per iteration, feeds it the
//! phase prompt on stdin, and streams its stdout line by line. JSON
//! event lines go through the broker as they arrive; everything else is
//! transcript text. Prompt and transcript land in the log directory for
//! post-mortems.

use super::protocol::{AgentEvent, PhaseSignal, RevisionRequest};
use super::{IterationContext, IterationOutcome, ReasoningAgent};
use crate::broker::{ActionBroker, ActionReceipt};
use crate::phase::PhaseKind;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

pub struct ProcessAgent {
    agent_cmd: String,
    project_dir: PathBuf,
    log_dir: PathBuf,
}

impl ProcessAgent {
    pub fn new(
        agent_cmd: impl Into<String>,
        project_dir: impl AsRef<Path>,
        log_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            agent_cmd: agent_cmd.into(),
            project_dir: project_dir.as_ref().to_path_buf(),
            log_dir: log_dir.as_ref().to_path_buf(),
        }
    }

    fn prompt_file(&self, ctx: &IterationContext) -> PathBuf {
        self.log_dir.join(format!(
            "{}-{}-iter-{}-prompt.md",
            ctx.construction, ctx.phase, ctx.iteration
        ))
    }

    fn output_file(&self, ctx: &IterationContext) -> PathBuf {
        self.log_dir.join(format!(
            "{}-{}-iter-{}-output.log",
            ctx.construction, ctx.phase, ctx.iteration
        ))
    }

    fn generate_prompt(&self, ctx: &IterationContext) -> String {
        let rules = ctx.phase.rules();

        let spec_path = self.project_dir.join(&ctx.spec_ref);
        let spec_section = std::fs::read_to_string(&spec_path).unwrap_or_else(|_| {
            format!(
                "(no specification artifact yet; it will live at {})",
                ctx.spec_ref
            )
        });

        let writable = if rules.writable.is_empty() {
            "none; this phase only runs commands".to_string()
        } else {
            rules
                .writable
                .iter()
                .map(|c| c.pattern())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let read_only = rules
            .read_only
            .iter()
            .map(|c| c.pattern())
            .collect::<Vec<_>>()
            .join(", ");
        let categories = rules
            .categories
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let placeholder_rule = if rules.placeholder_only {
            "\n- Every proof body you write this phase must be the `sorry` placeholder. \
             Proof tactics are rejected; the goal is a type-correct skeleton, not a proof.\n"
        } else {
            "\n"
        };

        let feedback_section = if ctx.feedback.is_empty() {
            String::new()
        } else {
            format!(
                "\n## FEEDBACK FROM PREVIOUS ITERATION\n{}\n",
                ctx.feedback
                    .iter()
                    .map(|line| format!("- {}", line))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        };

        format!(
            r#"You are the reasoning engine of a theorem-proving pipeline, working on one construction in one phase.

## CONSTRUCTION
Name: {name}
Phase: {label}
Objective: {objective}
Iteration: {iteration}

## SPECIFICATION
{spec}

## PHASE RULES
- Writable paths: {writable}
- Locked read-only this phase: {read_only}
- Allowed actions: {categories}{placeholder_rule}- The tokens axiom, admit, sorryAx, native_decide and skipKernelTC are forbidden everywhere, and git history must never be rewritten. Such actions are denied automatically.

## ACTION PROTOCOL
Emit one JSON object per stdout line. Any other line is kept as notes.
{{"type":"create_resource","path":"<relative path>","content":"<full file content>"}}
{{"type":"modify_resource","path":"<relative path>","content":"<full new content>"}}
{{"type":"execute_command","command":"<shell command>"}}
{{"type":"note","text":"<free-form remark>"}}
{{"type":"revision","description":"<what is flawed>","evidence":"<why you believe so>","restart_from":"<phase name>"}}
{{"type":"phase_complete"}}
{feedback}
## COMPLETION
Work toward the objective. Emit phase_complete as your final line only when the objective is genuinely met. If an artifact from an earlier phase is flawed and blocks you, emit a revision event naming the phase to restart from instead of working around it."#,
            name = ctx.construction,
            label = ctx.phase.label(),
            objective = ctx.phase.objective(),
            iteration = ctx.iteration,
            spec = spec_section,
            writable = writable,
            read_only = read_only,
            categories = categories,
            placeholder_rule = placeholder_rule,
            feedback = feedback_section,
        )
    }
}

#[async_trait]
impl ReasoningAgent for ProcessAgent {
    async fn run_iteration(
        &self,
        ctx: &IterationContext,
        broker: &ActionBroker,
    ) -> Result<IterationOutcome> {
        let prompt = self.generate_prompt(ctx);
        let prompt_file = self.prompt_file(ctx);
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        std::fs::write(&prompt_file, &prompt).context("Failed to write prompt file")?;

        tracing::info!(
            construction = %ctx.construction,
            phase = %ctx.phase,
            iteration = ctx.iteration,
            command = %self.agent_cmd,
            "Spawning reasoning agent"
        );
        let start = Instant::now();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.agent_cmd)
            .current_dir(&self.project_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn agent command: {}", self.agent_cmd))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to agent stdin")?;
            stdin.shutdown().await.context("Failed to close agent stdin")?;
        }

        let stderr = child.stderr.take().context("Failed to get agent stderr")?;
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let stdout = child.stdout.take().context("Failed to get agent stdout")?;
        let mut reader = BufReader::new(stdout).lines();

        let mut outcome = IterationOutcome::default();
        let mut transcript = String::new();

        while let Some(line) = reader.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<AgentEvent>(&line) {
                Ok(AgentEvent::PhaseComplete) => {
                    if outcome.signal.is_none() {
                        outcome.signal = Some(PhaseSignal::Complete);
                    }
                }
                Ok(AgentEvent::Revision {
                    description,
                    evidence,
                    restart_from,
                }) => {
                    if outcome.signal.is_none() {
                        outcome.signal = Some(PhaseSignal::Revision(RevisionRequest {
                            description,
                            evidence,
                            restart_from,
                        }));
                    }
                }
                Ok(AgentEvent::Note { text }) => {
                    tracing::debug!(construction = %ctx.construction, "agent note: {}", text);
                    transcript.push_str(&text);
                    transcript.push('\n');
                }
                Ok(event) => match broker.apply(&event).await? {
                    ActionReceipt::Applied { summary } => {
                        outcome.applied += 1;
                        transcript.push_str(&format!("[applied] {}\n", summary));
                    }
                    ActionReceipt::Denied { summary, reason } => {
                        transcript.push_str(&format!("[denied] {}: {}\n", summary, reason));
                        outcome.denied.push(format!("{} ({})", summary, reason));
                    }
                    ActionReceipt::Executed {
                        summary,
                        exit_code,
                        output,
                    } => {
                        outcome.applied += 1;
                        transcript.push_str(&format!("[exit {}] {}\n{}\n", exit_code, summary, output));
                        if exit_code != 0 {
                            outcome
                                .failed_commands
                                .push(format!("{} exited {}: {}", summary, exit_code, output));
                        }
                    }
                },
                Err(_) => {
                    transcript.push_str(&line);
                    transcript.push('\n');
                }
            }
        }

        let status = child.wait().await.context("Failed to wait for agent")?;
        if let Ok(stderr_text) = stderr_task.await
            && !stderr_text.trim().is_empty()
        {
            transcript.push_str("\n[stderr]\n");
            transcript.push_str(&stderr_text);
        }

        let output_file = self.output_file(ctx);
        std::fs::write(&output_file, &transcript).context("Failed to write agent transcript")?;
        outcome.output_file = Some(output_file);

        tracing::info!(
            construction = %ctx.construction,
            phase = %ctx.phase,
            iteration = ctx.iteration,
            elapsed_secs = start.elapsed().as_secs(),
            exit_code = status.code().unwrap_or(-1),
            applied = outcome.applied,
            denied = outcome.denied.len(),
            signalled = outcome.signal.is_some(),
            "Agent iteration finished"
        );

        Ok(outcome)
    }
}
