//! Project introspection — `crucible status`.
//!
//! Read-only by contract: nothing here creates directories, records, or
//! queue rows.

use anyhow::Result;
use std::path::Path;

pub fn cmd_status(project_dir: &Path, construction: Option<&str>) -> Result<()> {
    use crucible::config::Config;
    use crucible::locks::LockManager;
    use crucible::oracle::scan_proof_dir;
    use crucible::phase::ResourceClass;
    use crucible::queue::WorkQueue;

    println!();
    println!("Crucible Project Status");
    println!("=======================");
    println!();

    let config = Config::new(project_dir.to_path_buf(), false, None)?;
    if !config.state_dir.exists() {
        println!("Project: Not initialized");
        println!();
        println!("Run 'crucible init' to initialize the project.");
        println!();
        return Ok(());
    }
    println!("Project: {}", config.project_dir.display());

    // Proof artifacts
    let scan = scan_proof_dir(&config.proof_dir())?;
    println!(
        "Proofs:  {} file(s) scanned, {} placeholder(s), {} forbidden token(s)",
        scan.files_scanned, scan.placeholder_count, scan.forbidden_count
    );

    // Lock table
    let locks = LockManager::new(config.locks_file.clone());
    let table = locks.snapshot()?;
    let locked: Vec<String> = ResourceClass::ALL
        .iter()
        .filter(|class| table.state_of(**class) != crucible::locks::LockState::Writable)
        .map(|class| class.to_string())
        .collect();
    if locked.is_empty() {
        println!("Locks:   all resource classes writable");
    } else {
        println!("Locks:   read-only: {}", locked.join(", "));
    }
    println!();

    // Queue
    if !config.queue_file.exists() {
        println!("Queue:   missing (run 'crucible init' to scaffold QUEUE.md)");
        println!();
        return Ok(());
    }
    let queue = WorkQueue::new(config.queue_file.clone());
    let entries = queue.load()?;
    if entries.is_empty() {
        println!("Queue:   empty (add a construction row to QUEUE.md)");
    } else {
        println!("Queue:   {} construction(s)", entries.len());
        for entry in &entries {
            println!(
                "  [{}] {:<24} {}",
                entry.priority, entry.name, entry.status
            );
        }
    }
    println!();

    if let Some(name) = construction {
        print_construction_detail(&config, name)?;
    }

    Ok(())
}

fn print_construction_detail(config: &crucible::config::Config, name: &str) -> Result<()> {
    use crucible::controller::RevisionLog;
    use crucible::queue::RecordStore;

    let records = RecordStore::new(config.records_dir.clone());
    let Some(record) = records.load(name)? else {
        println!(
            "{}: no record yet; it is created on the first phase run",
            name
        );
        println!();
        return Ok(());
    };

    println!("{}", record.name);
    println!("  id:         {}", record.id);
    println!("  status:     {}", record.status);
    println!("  next phase: {}", record.next_phase);
    println!(
        "  revisions:  {}/{}",
        record.revision_count, config.toml.defaults.max_revisions
    );
    if let Some(hash) = &record.spec_hash {
        println!("  spec hash:  {}", hash);
    }
    if record.status == crucible::phase::ConstructionStatus::Blocked {
        println!(
            "  acknowledged: {}",
            if record.acknowledged { "yes" } else { "no" }
        );
    }
    println!("  updated:    {}", record.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));

    let revisions = RevisionLog::new(config.revisions_dir.clone()).list(name)?;
    if let Some(last) = revisions.last() {
        println!(
            "  last revision: #{} raised in {} -> restart at {}: {}",
            last.sequence, last.raised_in, last.restart_from, last.description
        );
    }
    println!();
    Ok(())
}
