//! Project scaffolding and operator interventions.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;

use crucible::config::Config;
use crucible::crucible_config::CrucibleToml;
use crucible::phase::ConstructionStatus;
use crucible::queue::{RecordStore, WorkQueue};

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let was_initialized = project_dir.join(".crucible").exists();

    let config = Config::new(project_dir.to_path_buf(), false, None)?;
    config.ensure_directories()?;

    let toml_path = CrucibleToml::config_path(&config.state_dir);
    if !toml_path.exists() {
        config.toml.save(&config.state_dir)?;
    }
    WorkQueue::new(config.queue_file.clone()).scaffold()?;

    if was_initialized {
        println!(
            "Crucible project already initialized at {}",
            config.state_dir.display()
        );
        println!("Directory structure verified.");
        return Ok(());
    }

    println!(
        "Initialized crucible project at {}",
        config.state_dir.display()
    );
    println!();
    println!("Created:");
    println!("  QUEUE.md            # construction queue; one row per construction");
    println!("  .crucible/");
    println!("  ├── crucible.toml   # budgets, agent command, oracle settings");
    println!("  ├── locks.json      # durable resource lock table");
    println!("  ├── state/          # per-construction records");
    println!("  ├── revisions/      # archived revision records");
    println!("  ├── results/        # archived completed constructions");
    println!("  ├── audit/runs/     # audit trail");
    println!("  └── logs/           # agent transcripts and pipeline log");
    println!();
    println!("Next steps:");
    println!("  1. Add a construction row to QUEUE.md");
    println!("  2. Run `crucible survey <name>` to start it, or `crucible full <name>`");
    println!("  3. Run `crucible program` to work the whole queue");

    Ok(())
}

/// Mark a blocked construction as seen so the scheduler stops re-surfacing it.
pub fn cmd_acknowledge(project_dir: &Path, construction: &str) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf(), false, None)?;
    let records = RecordStore::new(config.records_dir.clone());
    let mut record = records
        .load(construction)?
        .with_context(|| format!("No record found for construction '{}'", construction))?;

    if record.status != ConstructionStatus::Blocked {
        anyhow::bail!(
            "Construction '{}' is not blocked (status: {})",
            construction,
            record.status
        );
    }
    if record.acknowledged {
        println!("'{}' is already acknowledged.", construction);
        return Ok(());
    }

    record.acknowledged = true;
    record.updated_at = Utc::now();
    records.save(&record)?;

    println!(
        "Acknowledged '{}'. Run 'crucible reopen {}' when you are ready to resume work on it.",
        construction, construction
    );
    Ok(())
}

/// Manual intervention on a blocked construction: reset its revision budget
/// and lift Blocked so the pipeline may pick it up again.
pub fn cmd_reopen(project_dir: &Path, construction: &str, yes: bool) -> Result<()> {
    use dialoguer::Confirm;

    let config = Config::new(project_dir.to_path_buf(), false, None)?;
    let records = RecordStore::new(config.records_dir.clone());
    let mut record = records
        .load(construction)?
        .with_context(|| format!("No record found for construction '{}'", construction))?;

    if record.status != ConstructionStatus::Blocked {
        anyhow::bail!(
            "Construction '{}' is not blocked (status: {})",
            construction,
            record.status
        );
    }

    if !yes {
        let confirm = Confirm::new()
            .with_prompt(format!(
                "Reopen '{}' at phase {} and reset its revision budget?",
                construction, record.next_phase
            ))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirm {
            println!("Reopen cancelled");
            return Ok(());
        }
    }

    record.revision_count = 0;
    record.status = ConstructionStatus::Revision;
    record.acknowledged = false;
    record.updated_at = Utc::now();
    records.save(&record)?;
    WorkQueue::new(config.queue_file.clone()).set_status(construction, record.status)?;

    println!(
        "Reopened '{}'; work resumes at phase {}.",
        construction, record.next_phase
    );
    Ok(())
}
