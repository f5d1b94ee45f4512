use crate::phase::PhaseKind;
use crate::ui::icons::{ARCHIVE, BLOCKER, CHECK, CROSS, DENY, REVISION, SPARKLE};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Terminal UI for pipeline runs, rendered via `indicatif`.
///
/// Two bars are stacked vertically:
/// - Phase bar — tracks how many phases have completed this run
/// - Iteration bar — spinner with the current iteration and live status
///
/// Operator-facing rendering only; structured logging goes through
/// `tracing` separately.
pub struct PipelineUi {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    iteration_bar: ProgressBar,
    verbose: bool,
    current_iter: AtomicU32,
    max_iter: AtomicU32,
}

impl PipelineUi {
    /// `total_phases` sizes the phase bar; pass the number of phases the
    /// run intends to execute (one for single-phase verbs).
    pub fn new(total_phases: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let phase_bar = multi.add(ProgressBar::new(total_phases));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phases");

        let iteration_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let iteration_bar = multi.add(ProgressBar::new_spinner());
        iteration_bar.set_style(iteration_style);
        iteration_bar.set_prefix("  Iter");

        Self {
            multi,
            phase_bar,
            iteration_bar,
            verbose,
            current_iter: AtomicU32::new(0),
            max_iter: AtomicU32::new(0),
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` so
    /// denials and blockers are never lost when the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Print the header block for a phase and update the phase bar.
    pub fn start_phase(&self, construction: &str, phase: PhaseKind, budget: u32) {
        self.print_line("");
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} {} — {}",
            style("▶").green().bold(),
            style(construction).yellow().bold(),
            style(phase.label()).bold()
        ));
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!("{}  {}", style("Objective:").dim(), phase.objective()));
        self.print_line(format!("{}  {} iterations max", style("Budget:").dim(), budget));
        self.print_line("");
        self.phase_bar
            .set_message(format!("{}: {}", style(construction).yellow(), phase.label()));
    }

    pub fn start_iteration(&self, iter: u32, max: u32) {
        self.current_iter.store(iter, Ordering::SeqCst);
        self.max_iter.store(max, Ordering::SeqCst);
        self.iteration_bar.set_message(format!(
            "Running iteration {}/{} {}",
            style(iter).cyan(),
            max,
            style("(agent working...)").dim()
        ));
        self.iteration_bar
            .enable_steady_tick(Duration::from_millis(100));
    }

    /// Update the iteration spinner with a short status string.
    pub fn log_step(&self, msg: &str) {
        let iter = self.current_iter.load(Ordering::SeqCst);
        let max = self.max_iter.load(Ordering::SeqCst);
        self.iteration_bar.set_message(format!(
            "Running iteration {}/{} {}",
            style(iter).cyan(),
            max,
            style(format!("({})", msg)).dim()
        ));
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    /// Denials are always printed; they are operator-facing by contract.
    pub fn show_denial(&self, line: &str) {
        self.print_line(format!("    {} {}", DENY, style(line).red()));
    }

    pub fn show_verification_failure(&self, detail: &str) {
        self.print_line(format!(
            "    {} {}",
            CROSS,
            style(format!("verification rejected completion: {}", detail)).red()
        ));
    }

    pub fn iteration_success(&self, iter: u32) {
        self.iteration_bar.finish_with_message(format!(
            "{} Iteration {} complete - phase objective met",
            CHECK, iter
        ));
    }

    pub fn iteration_continue(&self, iter: u32) {
        self.iteration_bar.finish_with_message(format!(
            "Iteration {} - no completion signal yet, continuing...",
            iter
        ));
    }

    pub fn phase_complete(&self, construction: &str, phase: PhaseKind) {
        self.phase_bar.inc(1);
        self.print_line(format!(
            "\n{} {} {} complete!\n",
            SPARKLE,
            style(construction).green().bold(),
            phase.label()
        ));
    }

    pub fn phase_failed(&self, construction: &str, phase: PhaseKind, reason: &str) {
        self.print_line(format!(
            "\n{} {} {} failed: {}\n",
            CROSS,
            style(construction).red().bold(),
            phase.label(),
            reason
        ));
    }

    pub fn show_revision(&self, construction: &str, restart_from: PhaseKind, description: &str) {
        self.print_line(format!(
            "    {} {} rolls back to {}: {}",
            REVISION,
            style(construction).yellow().bold(),
            style(restart_from.label()).yellow(),
            description
        ));
    }

    pub fn show_blocked(&self, construction: &str, limit: u32) {
        self.print_line(format!(
            "    {} {}",
            BLOCKER,
            style(format!(
                "{} is BLOCKED after {} revisions; run 'crucible acknowledge {}' then 'crucible reopen {}' to intervene",
                construction, limit, construction, construction
            ))
            .red()
            .bold()
        ));
    }

    /// Reminder line for blocked records the operator has not acknowledged.
    pub fn show_unacknowledged(&self, construction: &str) {
        self.print_line(format!(
            "    {} {}",
            BLOCKER,
            style(format!(
                "{} remains blocked and unacknowledged",
                construction
            ))
            .yellow()
        ));
    }

    pub fn show_archived(&self, construction: &str) {
        self.print_line(format!(
            "    {} {} archived to results",
            ARCHIVE,
            style(construction).green()
        ));
    }
}
