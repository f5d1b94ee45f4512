//! Phase execution.
//!
//! One `PhaseController` drives a construction through the pipeline:
//! artifact prechecks, lock acquisition, the iteration loop against the
//! reasoning agent, oracle consultation during Audit, and the bookkeeping
//! a phase outcome implies (records, queue mirror, revisions, archive).

pub mod revision;
pub use revision::{RevisionLog, RevisionRecord};

use crate::agent::protocol::{PhaseSignal, RevisionRequest};
use crate::agent::{IterationContext, ReasoningAgent};
use crate::archive::Archiver;
use crate::audit::{AuditLogger, IterationAudit, PhaseAudit, PhaseOutcome};
use crate::broker::ActionBroker;
use crate::config::Config;
use crate::errors::PipelineError;
use crate::locks::{LockManager, PhaseLockGuard};
use crate::oracle::VerificationOracle;
use crate::phase::{ConstructionStatus, PhaseKind, ResourceClass};
use crate::queue::{compute_spec_hash, ConstructionRecord, RecordStore, WorkQueue};
use crate::ui::PipelineUi;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// How a phase run ended, for callers that keep going.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseRun {
    Completed { iterations: u32 },
    Revised { restart_from: PhaseKind },
}

pub struct PhaseController {
    config: Config,
    locks: LockManager,
    records: RecordStore,
    queue: WorkQueue,
    revisions: RevisionLog,
    archiver: Archiver,
    agent: Arc<dyn ReasoningAgent>,
    oracle: Arc<dyn VerificationOracle>,
    ui: Arc<PipelineUi>,
}

impl PhaseController {
    pub fn new(
        config: Config,
        agent: Arc<dyn ReasoningAgent>,
        oracle: Arc<dyn VerificationOracle>,
        ui: Arc<PipelineUi>,
    ) -> Self {
        let locks = LockManager::new(config.locks_file.clone());
        let records = RecordStore::new(config.records_dir.clone());
        let queue = WorkQueue::new(config.queue_file.clone());
        let revisions = RevisionLog::new(config.revisions_dir.clone());
        let archiver = Archiver::new(&config.project_dir, &config.results_dir);
        Self {
            config,
            locks,
            records,
            queue,
            revisions,
            archiver,
            agent,
            oracle,
            ui,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn revisions(&self) -> &RevisionLog {
        &self.revisions
    }

    /// Execute the construction's next phase.
    ///
    /// Runs agent iterations until one signals completion or a revision,
    /// or the iteration budget runs out. The record and the queue mirror
    /// are saved before this returns, whatever the outcome.
    pub async fn run_phase(
        &self,
        record: &mut ConstructionRecord,
        audit: &mut AuditLogger,
    ) -> Result<PhaseRun, PipelineError> {
        if record.status == ConstructionStatus::Done {
            return Err(PipelineError::AlreadyDone {
                construction: record.name.clone(),
            });
        }
        if record.status == ConstructionStatus::Blocked {
            return Err(PipelineError::Blocked {
                construction: record.name.clone(),
            });
        }

        let phase = record.next_phase;
        self.check_required_artifact(record, phase)?;

        let budget = self.config.toml.budget_for(phase);
        self.ui.start_phase(&record.name, phase, budget);
        tracing::info!(construction = %record.name, phase = %phase, budget, "phase started");

        let mut phase_audit = PhaseAudit::new(&record.name, phase);
        let guard = PhaseLockGuard::acquire(&self.locks, phase)?;
        let broker = ActionBroker::new(
            &self.config.project_dir,
            self.locks.clone(),
            phase,
            &record.name,
            self.config.toml.defaults.command_timeout_secs,
        );

        let mut feedback: Vec<String> = Vec::new();
        let mut last_verification: Option<String> = None;

        for iter in 1..=budget {
            self.ui.start_iteration(iter, budget);
            let ctx = IterationContext::new(
                &record.name,
                &record.spec_ref,
                phase,
                iter,
                feedback.clone(),
            );
            let started_at = Utc::now();
            let clock = Instant::now();

            let outcome = self.agent.run_iteration(&ctx, &broker).await?;

            for denial in &outcome.denied {
                self.ui.show_denial(denial);
            }
            feedback = outcome.feedback();

            let mut iteration_audit = IterationAudit {
                iteration: iter,
                started_at,
                duration_secs: clock.elapsed().as_secs_f64(),
                applied_actions: outcome.applied,
                denials: outcome.denied.clone(),
                failed_commands: outcome.failed_commands.clone(),
                signal: None,
                output_file: outcome.output_file.clone(),
            };

            match outcome.signal {
                Some(PhaseSignal::Complete) => {
                    if phase == PhaseKind::Audit {
                        let report = self.oracle.verify().await?;
                        if !report.is_sound() {
                            let summary = report.summary();
                            self.ui.show_verification_failure(&summary);
                            iteration_audit.signal = Some("complete_rejected".to_string());
                            phase_audit.iterations.push(iteration_audit);
                            feedback.push(format!("verification failed: {}", summary));
                            last_verification = Some(summary);
                            continue;
                        }
                    }
                    iteration_audit.signal = Some("complete".to_string());
                    phase_audit.iterations.push(iteration_audit);
                    self.ui.iteration_success(iter);
                    return self.complete_phase(record, phase, iter, guard, phase_audit, audit);
                }
                Some(PhaseSignal::Revision(request)) => {
                    // A revision may only restart at or before the current phase.
                    if request.restart_from.index() > phase.index() {
                        let msg = format!(
                            "revision rejected: restart phase {} is ahead of the current phase {}",
                            request.restart_from, phase
                        );
                        self.ui.show_denial(&msg);
                        iteration_audit.signal = Some("revision_rejected".to_string());
                        phase_audit.iterations.push(iteration_audit);
                        feedback.push(msg);
                        continue;
                    }
                    iteration_audit.signal = Some("revision".to_string());
                    phase_audit.iterations.push(iteration_audit);
                    return self.handle_revision(record, phase, request, guard, phase_audit, audit);
                }
                None => {
                    phase_audit.iterations.push(iteration_audit);
                    self.ui.iteration_continue(iter);
                    if iter < budget {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        }

        guard.release()?;
        let error = if let Some(detail) = last_verification {
            phase_audit.finish(PhaseOutcome::VerificationFailed {
                detail: detail.clone(),
            });
            PipelineError::VerificationFailure { detail }
        } else {
            phase_audit.finish(PhaseOutcome::BudgetExhausted);
            PipelineError::BudgetExhausted {
                phase: phase.to_string(),
                iterations: budget,
            }
        };
        audit.add_phase(phase_audit)?;
        self.ui.phase_failed(&record.name, phase, &error.to_string());
        tracing::warn!(construction = %record.name, phase = %phase, %error, "phase failed");
        Err(error)
    }

    /// Keep running phases until the construction reaches Done. Returns
    /// the number of phases completed.
    pub async fn run_to_done(
        &self,
        record: &mut ConstructionRecord,
        audit: &mut AuditLogger,
    ) -> Result<u32, PipelineError> {
        let mut phases_run = 0u32;
        while record.status != ConstructionStatus::Done {
            self.run_phase(record, audit).await?;
            phases_run += 1;
        }
        Ok(phases_run)
    }

    /// A phase may only start once the artifact the previous phase owes it
    /// exists on disk.
    fn check_required_artifact(
        &self,
        record: &ConstructionRecord,
        phase: PhaseKind,
    ) -> Result<(), PipelineError> {
        let Some(class) = phase.required_artifact() else {
            return Ok(());
        };
        let path = if class == ResourceClass::Specification {
            self.config.project_dir.join(&record.spec_ref)
        } else {
            self.config.project_dir.join(class.dir())
        };
        let satisfied = if class == ResourceClass::Specification {
            path.is_file()
        } else {
            dir_has_files(&path)
        };
        if satisfied {
            Ok(())
        } else {
            Err(PipelineError::MissingArtifact {
                phase: phase.to_string(),
                path,
            })
        }
    }

    fn complete_phase(
        &self,
        record: &mut ConstructionRecord,
        phase: PhaseKind,
        iteration: u32,
        guard: PhaseLockGuard,
        mut phase_audit: PhaseAudit,
        audit: &mut AuditLogger,
    ) -> Result<PhaseRun, PipelineError> {
        guard.release()?;

        let previous_status = record.status;
        if let Some(status) = phase.status_on_success() {
            record.status = status;
        }
        if phase == PhaseKind::Specify {
            // The specification artifact exists now; pin its digest.
            let spec_path = self.config.project_dir.join(&record.spec_ref);
            if let Ok(content) = fs::read_to_string(&spec_path) {
                record.spec_hash = Some(compute_spec_hash(&content));
            }
        }
        if let Some(next) = phase.next() {
            record.next_phase = next;
        }
        record.updated_at = Utc::now();

        if record.status == ConstructionStatus::Done {
            let dest = self.archiver.archive(record)?;
            self.locks.unlock_all()?;
            self.ui.show_archived(&record.name);
            tracing::info!(
                construction = %record.name,
                dest = %dest.display(),
                "construction archived"
            );
        }

        self.records.save(record)?;
        if record.status != previous_status {
            self.queue.set_status(&record.name, record.status)?;
        }

        phase_audit.finish(PhaseOutcome::Completed { iteration });
        audit.add_phase(phase_audit)?;
        self.ui.phase_complete(&record.name, phase);
        tracing::info!(
            construction = %record.name,
            phase = %phase,
            iteration,
            next = %record.next_phase,
            "phase complete"
        );
        Ok(PhaseRun::Completed {
            iterations: iteration,
        })
    }

    /// Archive the revision, spend one unit of revision budget, then either
    /// roll the construction back or block it.
    fn handle_revision(
        &self,
        record: &mut ConstructionRecord,
        phase: PhaseKind,
        request: RevisionRequest,
        guard: PhaseLockGuard,
        mut phase_audit: PhaseAudit,
        audit: &mut AuditLogger,
    ) -> Result<PhaseRun, PipelineError> {
        guard.release()?;

        record.revision_count += 1;
        let revision = RevisionRecord {
            sequence: record.revision_count,
            construction: record.name.clone(),
            raised_in: phase,
            restart_from: request.restart_from,
            description: request.description.clone(),
            evidence: request.evidence.clone(),
            raised_at: Utc::now(),
        };
        self.revisions.archive(&revision)?;

        let limit = self.config.toml.defaults.max_revisions;
        if record.revision_count >= limit {
            record.status = ConstructionStatus::Blocked;
            record.acknowledged = false;
            record.updated_at = Utc::now();
            self.records.save(record)?;
            self.queue.set_status(&record.name, record.status)?;
            phase_audit.finish(PhaseOutcome::Blocked {
                reason: format!("revision limit ({}) reached", limit),
            });
            audit.add_phase(phase_audit)?;
            self.ui.show_blocked(&record.name, limit);
            tracing::warn!(construction = %record.name, limit, "construction blocked");
            return Err(PipelineError::RevisionExhausted {
                construction: record.name.clone(),
                limit,
            });
        }

        record.next_phase = request.restart_from;
        record.status = ConstructionStatus::Revision;
        record.updated_at = Utc::now();
        self.records.save(record)?;
        self.queue.set_status(&record.name, record.status)?;
        phase_audit.finish(PhaseOutcome::Revised {
            restart_from: request.restart_from,
        });
        audit.add_phase(phase_audit)?;
        self.ui
            .show_revision(&record.name, request.restart_from, &request.description);
        tracing::info!(
            construction = %record.name,
            raised_in = %phase,
            restart_from = %request.restart_from,
            sequence = record.revision_count,
            "revision accepted"
        );
        Ok(PhaseRun::Revised {
            restart_from: request.restart_from,
        })
    }
}

fn dir_has_files(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| e.file_type().is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::protocol::{AgentEvent, RevisionRequest};
    use crate::agent::IterationOutcome;
    use crate::audit::RunConfig;
    use crate::broker::ActionReceipt;
    use crate::locks::LockState;
    use crate::oracle::{ArtifactScan, VerificationReport};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    // =========================================
    // Test doubles
    // =========================================

    /// Replays a fixed script, one event list per iteration.
    struct ScriptedAgent {
        script: Mutex<VecDeque<Vec<AgentEvent>>>,
    }

    impl ScriptedAgent {
        fn new(iterations: Vec<Vec<AgentEvent>>) -> Self {
            Self {
                script: Mutex::new(iterations.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl ReasoningAgent for ScriptedAgent {
        async fn run_iteration(
            &self,
            _ctx: &IterationContext,
            broker: &ActionBroker,
        ) -> Result<IterationOutcome> {
            let events = self.script.lock().unwrap().pop_front().unwrap_or_default();
            let mut outcome = IterationOutcome::default();
            for event in events {
                match event {
                    AgentEvent::PhaseComplete => {
                        outcome.signal = Some(PhaseSignal::Complete);
                        break;
                    }
                    AgentEvent::Revision {
                        description,
                        evidence,
                        restart_from,
                    } => {
                        outcome.signal = Some(PhaseSignal::Revision(RevisionRequest {
                            description,
                            evidence,
                            restart_from,
                        }));
                        break;
                    }
                    AgentEvent::Note { .. } => {}
                    other => match broker.apply(&other).await? {
                        ActionReceipt::Denied { reason, .. } => outcome.denied.push(reason),
                        ActionReceipt::Executed {
                            exit_code, output, ..
                        } if exit_code != 0 => outcome.failed_commands.push(output),
                        _ => outcome.applied += 1,
                    },
                }
            }
            Ok(outcome)
        }
    }

    /// Replays fixed verification reports; sound once the script runs dry.
    struct StaticOracle {
        reports: Mutex<VecDeque<VerificationReport>>,
    }

    impl StaticOracle {
        fn sound() -> Self {
            Self::with(vec![])
        }

        fn with(reports: Vec<VerificationReport>) -> Self {
            Self {
                reports: Mutex::new(reports.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl VerificationOracle for StaticOracle {
        async fn verify(&self) -> Result<VerificationReport> {
            Ok(self
                .reports
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(passing_report))
        }
    }

    fn passing_report() -> VerificationReport {
        VerificationReport {
            passed: true,
            scan: ArtifactScan::default(),
            detail: String::new(),
        }
    }

    fn failing_report(detail: &str) -> VerificationReport {
        VerificationReport {
            passed: false,
            scan: ArtifactScan::default(),
            detail: detail.to_string(),
        }
    }

    // =========================================
    // Fixture
    // =========================================

    fn setup(name: &str) -> (TempDir, Config) {
        let dir = tempdir().unwrap();
        let queue = format!(
            "# Construction Queue\n\n\
             | Priority | Construction | Specification | Status |\n\
             |----------|--------------|---------------|--------|\n\
             | 1 | {} | spec/{}.md | not_started |\n",
            name, name
        );
        fs::write(dir.path().join("QUEUE.md"), queue).unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        config.ensure_directories().unwrap();
        (dir, config)
    }

    fn controller(
        config: &Config,
        agent: ScriptedAgent,
        oracle: StaticOracle,
    ) -> PhaseController {
        PhaseController::new(
            config.clone(),
            Arc::new(agent),
            Arc::new(oracle),
            Arc::new(PipelineUi::new(PhaseKind::ALL.len() as u64, false)),
        )
    }

    fn make_record(config: &Config) -> ConstructionRecord {
        let queue = WorkQueue::new(config.queue_file.clone());
        let entry = queue.load().unwrap().into_iter().next().unwrap();
        RecordStore::new(config.records_dir.clone())
            .ensure(&entry, &config.project_dir)
            .unwrap()
    }

    fn audit_logger(config: &Config) -> AuditLogger {
        let mut logger = AuditLogger::new(&config.audit_dir);
        logger
            .start_run(RunConfig {
                command: "prove".to_string(),
                project_dir: config.project_dir.clone(),
                agent_cmd: "scripted".to_string(),
                verbose: false,
            })
            .unwrap();
        logger
    }

    fn seed(config: &Config, rel: &str, content: &str) {
        let path = config.project_dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn complete() -> Vec<AgentEvent> {
        vec![AgentEvent::PhaseComplete]
    }

    fn revise(restart_from: PhaseKind) -> Vec<AgentEvent> {
        vec![AgentEvent::Revision {
            description: "claim needs a nonnegativity hypothesis".to_string(),
            evidence: "counterexample at x = -1".to_string(),
            restart_from,
        }]
    }

    // =========================================
    // Completion tests
    // =========================================

    #[tokio::test]
    async fn test_phase_completion_advances_record() {
        let (_dir, config) = setup("am-gm");
        let ctl = controller(&config, ScriptedAgent::new(vec![complete()]), StaticOracle::sound());
        let mut record = make_record(&config);
        let mut audit = audit_logger(&config);

        let run = ctl.run_phase(&mut record, &mut audit).await.unwrap();

        assert_eq!(run, PhaseRun::Completed { iterations: 1 });
        assert_eq!(record.next_phase, PhaseKind::Specify);
        // Survey maps to no status of its own
        assert_eq!(record.status, ConstructionStatus::NotStarted);
        let reloaded = ctl.records().load("am-gm").unwrap().unwrap();
        assert_eq!(reloaded.next_phase, PhaseKind::Specify);
    }

    #[tokio::test]
    async fn test_specify_completion_records_spec_digest() {
        let (_dir, config) = setup("am-gm");
        seed(&config, "survey/am-gm.md", "# Prior art\n");
        let agent = ScriptedAgent::new(vec![vec![
            AgentEvent::CreateResource {
                path: "spec/am-gm.md".into(),
                content: "# AM-GM\n\nFor nonnegative reals the arithmetic mean dominates.\n"
                    .to_string(),
            },
            AgentEvent::PhaseComplete,
        ]]);
        let ctl = controller(&config, agent, StaticOracle::sound());
        let mut record = make_record(&config);
        record.next_phase = PhaseKind::Specify;
        ctl.records().save(&record).unwrap();
        let mut audit = audit_logger(&config);

        ctl.run_phase(&mut record, &mut audit).await.unwrap();

        assert_eq!(record.status, ConstructionStatus::Specified);
        assert_eq!(record.next_phase, PhaseKind::Construct);
        assert_eq!(record.spec_hash.as_ref().unwrap().len(), 12);
        let entry = ctl.queue().find("am-gm").unwrap().unwrap();
        assert_eq!(entry.status, ConstructionStatus::Specified);
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_before_iterating() {
        let (_dir, config) = setup("am-gm");
        let ctl = controller(&config, ScriptedAgent::new(vec![complete()]), StaticOracle::sound());
        let mut record = make_record(&config);
        record.next_phase = PhaseKind::Construct;
        let mut audit = audit_logger(&config);

        let err = ctl.run_phase(&mut record, &mut audit).await.unwrap_err();

        assert!(matches!(err, PipelineError::MissingArtifact { .. }));
        assert!(err.to_string().contains("spec/am-gm.md"));
        // No iteration ran, so no phase entered the audit trail.
        assert!(audit.current_run().unwrap().phases.is_empty());
    }

    #[tokio::test]
    async fn test_budget_exhaustion_releases_locks() {
        let (_dir, config) = setup("am-gm");
        let mut config = config;
        config.toml.defaults.iteration_budget = 2;
        let ctl = controller(
            &config,
            ScriptedAgent::new(vec![vec![], vec![]]),
            StaticOracle::sound(),
        );
        let mut record = make_record(&config);
        let mut audit = audit_logger(&config);

        let err = ctl.run_phase(&mut record, &mut audit).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::BudgetExhausted { iterations: 2, .. }
        ));
        let table = ctl.locks().snapshot().unwrap();
        for class in ResourceClass::ALL {
            assert_eq!(table.state_of(class), LockState::Writable);
        }
        let run = audit.current_run().unwrap();
        assert_eq!(run.phases[0].outcome, PhaseOutcome::BudgetExhausted);
        assert_eq!(run.phases[0].iterations.len(), 2);
    }

    // =========================================
    // Oracle tests
    // =========================================

    #[tokio::test]
    async fn test_audit_rejects_completion_until_oracle_passes() {
        let (_dir, config) = setup("am-gm");
        seed(&config, "proofs/AmGm.lean", "theorem am_gm : True := trivial\n");
        let agent = ScriptedAgent::new(vec![complete(), complete()]);
        let oracle = StaticOracle::with(vec![failing_report("type mismatch"), passing_report()]);
        let ctl = controller(&config, agent, oracle);
        let mut record = make_record(&config);
        record.next_phase = PhaseKind::Audit;
        record.status = ConstructionStatus::Proved;
        ctl.records().save(&record).unwrap();
        let mut audit = audit_logger(&config);

        let run = ctl.run_phase(&mut record, &mut audit).await.unwrap();

        assert_eq!(run, PhaseRun::Completed { iterations: 2 });
        assert_eq!(record.status, ConstructionStatus::Audited);
        assert_eq!(record.next_phase, PhaseKind::Log);
        let phases = &audit.current_run().unwrap().phases;
        assert_eq!(
            phases[0].iterations[0].signal.as_deref(),
            Some("complete_rejected")
        );
        assert_eq!(phases[0].iterations[1].signal.as_deref(), Some("complete"));
    }

    #[tokio::test]
    async fn test_audit_exhaustion_reports_verification_failure() {
        let (_dir, config) = setup("am-gm");
        seed(&config, "proofs/AmGm.lean", "theorem am_gm : True := trivial\n");
        let mut config = config;
        config.toml.defaults.iteration_budget = 2;
        let agent = ScriptedAgent::new(vec![complete(), complete()]);
        let oracle = StaticOracle::with(vec![
            failing_report("type mismatch"),
            failing_report("type mismatch"),
        ]);
        let ctl = controller(&config, agent, oracle);
        let mut record = make_record(&config);
        record.next_phase = PhaseKind::Audit;
        record.status = ConstructionStatus::Proved;
        ctl.records().save(&record).unwrap();
        let mut audit = audit_logger(&config);

        let err = ctl.run_phase(&mut record, &mut audit).await.unwrap_err();

        assert!(matches!(err, PipelineError::VerificationFailure { .. }));
        assert!(err.to_string().contains("type mismatch"));
        // Still parked on Audit for the next attempt.
        assert_eq!(record.next_phase, PhaseKind::Audit);
    }

    #[tokio::test]
    async fn test_non_audit_phase_never_consults_oracle() {
        let (_dir, config) = setup("am-gm");
        seed(&config, "proofs/AmGm.lean", "theorem am_gm : True := sorry\n");
        let agent = ScriptedAgent::new(vec![complete()]);
        // Would reject completion if it were consulted.
        let oracle = StaticOracle::with(vec![failing_report("broken")]);
        let ctl = controller(&config, agent, oracle);
        let mut record = make_record(&config);
        record.next_phase = PhaseKind::Prove;
        record.status = ConstructionStatus::Formalized;
        ctl.records().save(&record).unwrap();
        let mut audit = audit_logger(&config);

        let run = ctl.run_phase(&mut record, &mut audit).await.unwrap();

        assert_eq!(run, PhaseRun::Completed { iterations: 1 });
        assert_eq!(record.status, ConstructionStatus::Proved);
    }

    // =========================================
    // Revision tests
    // =========================================

    #[tokio::test]
    async fn test_revision_rolls_back_and_archives() {
        let (_dir, config) = setup("am-gm");
        seed(&config, "proofs/AmGm.lean", "theorem am_gm : True := sorry\n");
        let agent = ScriptedAgent::new(vec![revise(PhaseKind::Specify)]);
        let ctl = controller(&config, agent, StaticOracle::sound());
        let mut record = make_record(&config);
        record.next_phase = PhaseKind::Prove;
        record.status = ConstructionStatus::Formalized;
        ctl.records().save(&record).unwrap();
        let mut audit = audit_logger(&config);

        let run = ctl.run_phase(&mut record, &mut audit).await.unwrap();

        assert_eq!(
            run,
            PhaseRun::Revised {
                restart_from: PhaseKind::Specify
            }
        );
        assert_eq!(record.next_phase, PhaseKind::Specify);
        assert_eq!(record.status, ConstructionStatus::Revision);
        assert_eq!(record.revision_count, 1);
        let revisions = ctl.revisions().list("am-gm").unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].sequence, 1);
        assert_eq!(revisions[0].raised_in, PhaseKind::Prove);
        let entry = ctl.queue().find("am-gm").unwrap().unwrap();
        assert_eq!(entry.status, ConstructionStatus::Revision);
    }

    #[tokio::test]
    async fn test_forward_revision_rejected_without_spending_budget() {
        let (_dir, config) = setup("am-gm");
        seed(&config, "spec/am-gm.md", "# AM-GM\n");
        let agent = ScriptedAgent::new(vec![revise(PhaseKind::Prove), complete()]);
        let ctl = controller(&config, agent, StaticOracle::sound());
        let mut record = make_record(&config);
        record.next_phase = PhaseKind::Construct;
        record.status = ConstructionStatus::Specified;
        ctl.records().save(&record).unwrap();
        let mut audit = audit_logger(&config);

        let run = ctl.run_phase(&mut record, &mut audit).await.unwrap();

        assert_eq!(run, PhaseRun::Completed { iterations: 2 });
        assert_eq!(record.revision_count, 0);
        assert!(ctl.revisions().list("am-gm").unwrap().is_empty());
        let phases = &audit.current_run().unwrap().phases;
        assert_eq!(
            phases[0].iterations[0].signal.as_deref(),
            Some("revision_rejected")
        );
    }

    #[tokio::test]
    async fn test_revision_limit_blocks_construction() {
        let (_dir, config) = setup("am-gm");
        seed(&config, "proofs/AmGm.lean", "theorem am_gm : True := sorry\n");
        let mut config = config;
        config.toml.defaults.max_revisions = 1;
        let agent = ScriptedAgent::new(vec![revise(PhaseKind::Survey)]);
        let ctl = controller(&config, agent, StaticOracle::sound());
        let mut record = make_record(&config);
        record.next_phase = PhaseKind::Prove;
        record.status = ConstructionStatus::Formalized;
        ctl.records().save(&record).unwrap();
        let mut audit = audit_logger(&config);

        let err = ctl.run_phase(&mut record, &mut audit).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::RevisionExhausted { limit: 1, .. }
        ));
        assert_eq!(record.status, ConstructionStatus::Blocked);
        assert!(!record.acknowledged);
        // The revision itself is still archived.
        assert_eq!(ctl.revisions().list("am-gm").unwrap().len(), 1);
        let entry = ctl.queue().find("am-gm").unwrap().unwrap();
        assert_eq!(entry.status, ConstructionStatus::Blocked);

        // Blocked records refuse further work until an operator reopens them.
        let err = ctl.run_phase(&mut record, &mut audit).await.unwrap_err();
        assert!(matches!(err, PipelineError::Blocked { .. }));
    }

    // =========================================
    // Terminal phase tests
    // =========================================

    #[tokio::test]
    async fn test_log_completion_archives_results() {
        let (_dir, config) = setup("am-gm");
        seed(&config, "spec/am-gm.md", "# AM-GM\n");
        seed(&config, "construction/model.md", "induction on n\n");
        seed(&config, "proofs/AmGm.lean", "theorem am_gm : True := trivial\n");
        let agent = ScriptedAgent::new(vec![complete()]);
        let ctl = controller(&config, agent, StaticOracle::sound());
        let mut record = make_record(&config);
        record.next_phase = PhaseKind::Log;
        record.status = ConstructionStatus::Audited;
        ctl.records().save(&record).unwrap();
        let mut audit = audit_logger(&config);

        ctl.run_phase(&mut record, &mut audit).await.unwrap();

        assert_eq!(record.status, ConstructionStatus::Done);
        let dest = config.results_dir.join("am-gm");
        assert!(dest.join("manifest.json").is_file());
        assert!(dest.join("spec/am-gm.md").is_file());
        assert!(dest.join("proofs/AmGm.lean").is_file());
        let table = ctl.locks().snapshot().unwrap();
        for class in ResourceClass::ALL {
            assert_eq!(table.state_of(class), LockState::Writable);
        }
        let entry = ctl.queue().find("am-gm").unwrap().unwrap();
        assert_eq!(entry.status, ConstructionStatus::Done);

        let err = ctl.run_phase(&mut record, &mut audit).await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyDone { .. }));
    }

    #[tokio::test]
    async fn test_run_to_done_walks_every_phase() {
        let (_dir, config) = setup("am-gm");
        seed(&config, "survey/am-gm.md", "# Prior art\n");
        seed(&config, "spec/am-gm.md", "# AM-GM\n");
        seed(&config, "construction/model.md", "induction on n\n");
        seed(&config, "proofs/AmGm.lean", "theorem am_gm : True := trivial\n");
        let script = PhaseKind::ALL.iter().map(|_| complete()).collect();
        let ctl = controller(&config, ScriptedAgent::new(script), StaticOracle::sound());
        let mut record = make_record(&config);
        let mut audit = audit_logger(&config);

        let phases_run = ctl.run_to_done(&mut record, &mut audit).await.unwrap();

        assert_eq!(phases_run, 7);
        assert_eq!(record.status, ConstructionStatus::Done);
        assert_eq!(record.spec_hash.as_ref().unwrap().len(), 12);
        assert_eq!(audit.current_run().unwrap().phases.len(), 7);
    }
}
