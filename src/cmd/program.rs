//! Unattended queue processing — `crucible program`.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use super::super::Cli;
use super::run::{build_pipeline, Pipeline};
use crucible::scheduler::Scheduler;

pub async fn cmd_program(cli: &Cli, project_dir: PathBuf, max_cycles: u32) -> Result<()> {
    let Pipeline {
        config,
        controller,
        ui,
        mut audit,
        _instance_lock,
    } = build_pipeline(cli, project_dir, "program")?;

    let scheduler = Scheduler::new(config, controller, Arc::clone(&ui));
    let run = tokio::select! {
        result = scheduler.run(&mut audit, max_cycles) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    audit.finish_run()?;

    let Some(report) = run.transpose()? else {
        anyhow::bail!("Interrupted; phase locks released");
    };

    println!();
    println!(
        "Program finished: {} cycle(s), {} phase boundar{} crossed",
        report.cycles,
        report.phases_run,
        if report.phases_run == 1 { "y" } else { "ies" }
    );
    if !report.archived.is_empty() {
        println!("Archived: {}", report.archived.join(", "));
    }
    if !report.failures.is_empty() {
        println!("Failures:");
        for failure in &report.failures {
            println!("  {}: {}", failure.construction, failure.error);
        }
        anyhow::bail!(
            "{} construction(s) failed during the program run",
            report.failures.len()
        );
    }
    Ok(())
}
