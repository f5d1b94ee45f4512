//! Work queue scheduling.
//!
//! `Scheduler::run` drives many constructions through the pipeline
//! unattended: each cycle surfaces unacknowledged blocked entries, then
//! hands every eligible construction to the controller for up to
//! `cycle_phase_budget` phases, highest priority first. One construction
//! failing never stops the others.

use crate::config::Config;
use crate::controller::{PhaseController, PhaseRun};
use crate::errors::PipelineError;
use crate::phase::ConstructionStatus;
use crate::queue::{QueueEntry, RecordStore, WorkQueue};
use crate::ui::PipelineUi;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

use crate::audit::AuditLogger;

/// What a `program` run accomplished.
#[derive(Debug, Default)]
pub struct ProgramReport {
    pub cycles: u32,
    /// Phase boundaries crossed, completions and revisions both
    pub phases_run: u32,
    pub archived: Vec<String>,
    pub failures: Vec<ProgramFailure>,
}

#[derive(Debug)]
pub struct ProgramFailure {
    pub construction: String,
    pub error: String,
}

impl ProgramReport {
    pub fn successful(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Scheduler {
    controller: PhaseController,
    queue: WorkQueue,
    records: RecordStore,
    config: Config,
    ui: Arc<PipelineUi>,
}

impl Scheduler {
    pub fn new(config: Config, controller: PhaseController, ui: Arc<PipelineUi>) -> Self {
        let queue = WorkQueue::new(config.queue_file.clone());
        let records = RecordStore::new(config.records_dir.clone());
        Self {
            controller,
            queue,
            records,
            config,
            ui,
        }
    }

    /// Loop over the queue for up to `max_cycles` cycles, or until no
    /// eligible construction remains.
    pub async fn run(&self, audit: &mut AuditLogger, max_cycles: u32) -> Result<ProgramReport> {
        let mut report = ProgramReport::default();
        // Constructions whose phase input is missing; retrying them cannot
        // help, so they sit out the rest of the run.
        let mut halted: HashSet<String> = HashSet::new();

        for cycle in 1..=max_cycles {
            let entries = self.queue.load()?;
            self.surface_blocked(&entries)?;

            let mut visited: HashSet<String> = HashSet::new();
            let mut ran_any = false;
            while let Some(entry) = next_eligible(&entries, &visited, &halted) {
                visited.insert(entry.name.clone());
                ran_any = true;
                report.cycles = cycle;
                self.run_construction(entry, audit, &mut report, &mut halted)
                    .await?;
            }

            if !ran_any {
                tracing::info!(cycle, "no eligible constructions remain");
                break;
            }
        }

        tracing::info!(
            cycles = report.cycles,
            phases = report.phases_run,
            archived = report.archived.len(),
            failures = report.failures.len(),
            "program finished"
        );
        Ok(report)
    }

    async fn run_construction(
        &self,
        entry: &QueueEntry,
        audit: &mut AuditLogger,
        report: &mut ProgramReport,
        halted: &mut HashSet<String>,
    ) -> Result<()> {
        let mut record = self.records.ensure(entry, &self.config.project_dir)?;
        if !record.status.eligible() {
            // The queue cell lagged behind the record; the record wins.
            return Ok(());
        }

        for _ in 0..self.config.toml.defaults.cycle_phase_budget {
            match self.controller.run_phase(&mut record, audit).await {
                Ok(PhaseRun::Completed { .. }) | Ok(PhaseRun::Revised { .. }) => {
                    report.phases_run += 1;
                    if record.status == ConstructionStatus::Done {
                        report.archived.push(record.name.clone());
                        break;
                    }
                }
                Err(err) => {
                    if matches!(err, PipelineError::MissingArtifact { .. }) {
                        halted.insert(record.name.clone());
                    }
                    tracing::warn!(construction = %record.name, %err, "construction halted");
                    report.failures.push(ProgramFailure {
                        construction: record.name.clone(),
                        error: err.to_string(),
                    });
                    break;
                }
            }
        }
        Ok(())
    }

    /// A blocked construction stays visible until an operator acknowledges it.
    fn surface_blocked(&self, entries: &[QueueEntry]) -> Result<()> {
        for entry in entries {
            if entry.status != ConstructionStatus::Blocked {
                continue;
            }
            let record = self.records.ensure(entry, &self.config.project_dir)?;
            if !record.acknowledged {
                self.ui.show_unacknowledged(&entry.name);
                tracing::warn!(construction = %entry.name, "blocked and unacknowledged");
            }
        }
        Ok(())
    }
}

/// The next construction to work on: eligible, not yet visited this cycle,
/// highest priority (lowest number), queue position breaking ties.
fn next_eligible<'a>(
    entries: &'a [QueueEntry],
    visited: &HashSet<String>,
    halted: &HashSet<String>,
) -> Option<&'a QueueEntry> {
    entries
        .iter()
        .filter(|e| e.status.eligible())
        .filter(|e| !visited.contains(&e.name) && !halted.contains(&e.name))
        .min_by_key(|e| (e.priority, e.position))
}
