//! Construction queue and durable construction records.
//!
//! The operator-facing queue is a markdown table in `QUEUE.md`:
//!
//! ```markdown
//! | Priority | Construction | Specification | Status |
//! |----------|--------------|---------------|--------|
//! | 10 | cauchy-schwarz | spec/cauchy_schwarz.md | not_started |
//! ```
//!
//! Rows are added by hand; the pipeline only ever rewrites the status
//! cell, in place, leaving every other byte of the file untouched.
//!
//! The canonical per-construction state lives in
//! `.crucible/state/constructions/<name>.json` and is created on first
//! touch. The queue mirrors its status column from these records.

use crate::phase::{ConstructionStatus, PhaseKind};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One parsed row of `QUEUE.md`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub priority: u32,
    pub name: String,
    pub spec_ref: String,
    pub status: ConstructionStatus,
    /// Row order in the file, used to break priority ties
    pub position: usize,
}

pub struct WorkQueue {
    queue_file: PathBuf,
}

impl WorkQueue {
    pub fn new(queue_file: PathBuf) -> Self {
        Self { queue_file }
    }

    /// Write an empty queue with the table header. No-op if the file
    /// already exists.
    pub fn scaffold(&self) -> Result<()> {
        if self.queue_file.exists() {
            return Ok(());
        }
        let content = "# Construction Queue\n\n\
            | Priority | Construction | Specification | Status |\n\
            |----------|--------------|---------------|--------|\n";
        fs::write(&self.queue_file, content).with_context(|| {
            format!("Failed to write queue file: {}", self.queue_file.display())
        })?;
        Ok(())
    }

    /// Parse every construction row, in file order.
    pub fn load(&self) -> Result<Vec<QueueEntry>> {
        let content = self.read()?;
        let mut entries = Vec::new();

        for line in content.lines() {
            let Some(cells) = parse_row(line) else {
                continue;
            };
            let name = cells.1.to_string();
            if entries.iter().any(|e: &QueueEntry| e.name == name) {
                bail!("Duplicate construction '{}' in queue", name);
            }
            let status = cells
                .3
                .parse::<ConstructionStatus>()
                .with_context(|| format!("Invalid status in queue row for '{}'", name))?;
            entries.push(QueueEntry {
                priority: cells.0,
                name,
                spec_ref: cells.2.to_string(),
                status,
                position: entries.len(),
            });
        }

        Ok(entries)
    }

    /// Find one row by construction name.
    pub fn find(&self, name: &str) -> Result<Option<QueueEntry>> {
        Ok(self.load()?.into_iter().find(|e| e.name == name))
    }

    /// Rewrite the status cell of one row, preserving every other byte of
    /// the file.
    pub fn set_status(&self, name: &str, status: ConstructionStatus) -> Result<()> {
        let content = self.read()?;
        let mut found = false;
        let mut lines: Vec<String> = Vec::new();

        for line in content.lines() {
            let is_target = parse_row(line).is_some_and(|cells| cells.1 == name);
            if is_target {
                lines.push(replace_status_cell(line, status));
                found = true;
            } else {
                lines.push(line.to_string());
            }
        }

        if !found {
            bail!("Construction '{}' not found in queue", name);
        }

        let mut updated = lines.join("\n");
        if content.ends_with('\n') {
            updated.push('\n');
        }
        fs::write(&self.queue_file, updated).with_context(|| {
            format!("Failed to write queue file: {}", self.queue_file.display())
        })?;
        Ok(())
    }

    fn read(&self) -> Result<String> {
        if !self.queue_file.exists() {
            bail!(
                "Queue file not found: {} (run 'crucible init' first)",
                self.queue_file.display()
            );
        }
        fs::read_to_string(&self.queue_file)
            .with_context(|| format!("Failed to read queue file: {}", self.queue_file.display()))
    }
}

/// Split a table line into (priority, name, spec_ref, status) if it is a
/// construction row. Header and separator rows have non-numeric first
/// cells and fall out naturally.
fn parse_row(line: &str) -> Option<(u32, &str, &str, &str)> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('|') {
        return None;
    }
    let cells: Vec<&str> = trimmed.split('|').map(str::trim).collect();
    // leading pipe yields an empty first segment
    if cells.len() < 5 {
        return None;
    }
    let priority = cells[1].parse::<u32>().ok()?;
    Some((priority, cells[2], cells[3], cells[4]))
}

/// Replace the fourth cell of a row, keeping the other segments
/// byte-identical.
fn replace_status_cell(line: &str, status: ConstructionStatus) -> String {
    let mut segments: Vec<String> = line.split('|').map(str::to_string).collect();
    if segments.len() >= 5 {
        segments[4] = format!(" {} ", status);
    }
    segments.join("|")
}

/// Compute a SHA256 hash of specification content, truncated to 12 hex
/// characters, to track which spec version a record was built from.
pub fn compute_spec_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)[..12].to_string()
}

/// Durable per-construction state. The queue's status column mirrors
/// `status`; everything else is private to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructionRecord {
    pub id: Uuid,
    pub name: String,
    pub spec_ref: String,
    /// Digest of the specification artifact, recorded once it exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_hash: Option<String>,
    pub status: ConstructionStatus,
    /// Where execution resumes; the crash-recovery point
    pub next_phase: PhaseKind,
    pub revision_count: u32,
    /// Operator has acknowledged a blocked record
    #[serde(default)]
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConstructionRecord {
    fn new(entry: &QueueEntry, spec_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: entry.name.clone(),
            spec_ref: entry.spec_ref.clone(),
            spec_hash,
            status: entry.status,
            next_phase: PhaseKind::Survey,
            revision_count: 0,
            acknowledged: false,
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct RecordStore {
    records_dir: PathBuf,
}

impl RecordStore {
    pub fn new(records_dir: PathBuf) -> Self {
        Self { records_dir }
    }

    pub fn record_path(&self, name: &str) -> PathBuf {
        self.records_dir.join(format!("{}.json", name))
    }

    pub fn load(&self, name: &str) -> Result<Option<ConstructionRecord>> {
        validate_name(name)?;
        let path = self.record_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read construction record: {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse construction record: {}", path.display()))?;
        Ok(Some(record))
    }

    pub fn save(&self, record: &ConstructionRecord) -> Result<()> {
        validate_name(&record.name)?;
        fs::create_dir_all(&self.records_dir).with_context(|| {
            format!(
                "Failed to create records directory: {}",
                self.records_dir.display()
            )
        })?;
        let path = self.record_path(&record.name);
        let content = serde_json::to_string_pretty(record)
            .context("Failed to serialize construction record")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write construction record: {}", path.display()))?;
        Ok(())
    }

    /// Load the record for a queue entry, creating it on first touch. The
    /// spec digest is recorded if the referenced artifact already exists.
    pub fn ensure(&self, entry: &QueueEntry, project_dir: &Path) -> Result<ConstructionRecord> {
        if let Some(record) = self.load(&entry.name)? {
            return Ok(record);
        }
        let spec_path = project_dir.join(&entry.spec_ref);
        let spec_hash = match fs::read_to_string(&spec_path) {
            Ok(content) => Some(compute_spec_hash(&content)),
            Err(_) => None,
        };
        let record = ConstructionRecord::new(entry, spec_hash);
        self.save(&record)?;
        Ok(record)
    }
}

/// Construction names become file names and archive directories; keep
/// them to a safe alphabet.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!(
            "Invalid construction name '{}': use letters, digits, '-' and '_'",
            name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const QUEUE: &str = "# Construction Queue\n\n\
        | Priority | Construction | Specification | Status |\n\
        |----------|--------------|---------------|--------|\n\
        | 10 | cauchy-schwarz | spec/cauchy_schwarz.md | not_started |\n\
        | 20 | am-gm | spec/am_gm.md | specified |\n\
        | 10 | triangle-ineq | spec/triangle.md | done |\n";

    fn make_queue(content: &str) -> (WorkQueue, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("QUEUE.md");
        fs::write(&path, content).unwrap();
        (WorkQueue::new(path), dir)
    }

    // =========================================
    // Queue parsing tests
    // =========================================

    #[test]
    fn test_load_parses_rows_in_order() {
        let (queue, _dir) = make_queue(QUEUE);
        let entries = queue.load().unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "cauchy-schwarz");
        assert_eq!(entries[0].priority, 10);
        assert_eq!(entries[0].spec_ref, "spec/cauchy_schwarz.md");
        assert_eq!(entries[0].status, ConstructionStatus::NotStarted);
        assert_eq!(entries[0].position, 0);

        assert_eq!(entries[1].name, "am-gm");
        assert_eq!(entries[1].priority, 20);
        assert_eq!(entries[2].position, 2);
        assert_eq!(entries[2].status, ConstructionStatus::Done);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let queue = WorkQueue::new(dir.path().join("QUEUE.md"));
        let result = queue.load();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("crucible init"));
    }

    #[test]
    fn test_load_rejects_invalid_status() {
        let content = "| Priority | Construction | Specification | Status |\n\
            |---|---|---|---|\n\
            | 5 | bad-row | spec/x.md | halfway |\n";
        let (queue, _dir) = make_queue(content);
        let result = queue.load();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("bad-row"));
    }

    #[test]
    fn test_load_rejects_duplicate_names() {
        let content = "| Priority | Construction | Specification | Status |\n\
            |---|---|---|---|\n\
            | 5 | twin | spec/a.md | not_started |\n\
            | 6 | twin | spec/b.md | not_started |\n";
        let (queue, _dir) = make_queue(content);
        let result = queue.load();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_load_ignores_prose_between_tables() {
        let content = "# Queue\n\nSome notes about priorities.\n\n".to_string() + QUEUE;
        let (queue, _dir) = make_queue(&content);
        assert_eq!(queue.load().unwrap().len(), 3);
    }

    #[test]
    fn test_scaffold_creates_header_only_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("QUEUE.md");
        let queue = WorkQueue::new(path.clone());

        queue.scaffold().unwrap();
        assert!(queue.load().unwrap().is_empty());

        // existing content is preserved
        fs::write(&path, QUEUE).unwrap();
        queue.scaffold().unwrap();
        assert_eq!(queue.load().unwrap().len(), 3);
    }

    // =========================================
    // In-place status rewrite tests
    // =========================================

    #[test]
    fn test_set_status_rewrites_only_the_status_cell() {
        let (queue, _dir) = make_queue(QUEUE);
        queue
            .set_status("am-gm", ConstructionStatus::Proved)
            .unwrap();

        let entries = queue.load().unwrap();
        assert_eq!(entries[1].status, ConstructionStatus::Proved);
        // the other rows and cells are untouched
        assert_eq!(entries[0].status, ConstructionStatus::NotStarted);
        assert_eq!(entries[1].name, "am-gm");
        assert_eq!(entries[1].spec_ref, "spec/am_gm.md");

        let content = fs::read_to_string(queue.queue_file.clone()).unwrap();
        assert!(content.contains("| 10 | cauchy-schwarz | spec/cauchy_schwarz.md | not_started |"));
        assert!(content.contains("| 20 | am-gm | spec/am_gm.md | proved |"));
        assert!(content.starts_with("# Construction Queue\n"));
    }

    #[test]
    fn test_set_status_unknown_name_is_an_error() {
        let (queue, _dir) = make_queue(QUEUE);
        let result = queue.set_status("unknown", ConstructionStatus::Done);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    // =========================================
    // Record store tests
    // =========================================

    #[test]
    fn test_ensure_creates_record_on_first_touch() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("spec")).unwrap();
        fs::write(dir.path().join("spec/am_gm.md"), "# AM-GM inequality").unwrap();

        let store = RecordStore::new(dir.path().join("state/constructions"));
        let entry = QueueEntry {
            priority: 20,
            name: "am-gm".to_string(),
            spec_ref: "spec/am_gm.md".to_string(),
            status: ConstructionStatus::NotStarted,
            position: 0,
        };

        let record = store.ensure(&entry, dir.path()).unwrap();
        assert_eq!(record.name, "am-gm");
        assert_eq!(record.next_phase, PhaseKind::Survey);
        assert_eq!(record.revision_count, 0);
        assert_eq!(
            record.spec_hash.as_deref(),
            Some(compute_spec_hash("# AM-GM inequality").as_str())
        );

        // second touch loads the same record
        let again = store.ensure(&entry, dir.path()).unwrap();
        assert_eq!(again.id, record.id);
    }

    #[test]
    fn test_ensure_without_spec_artifact_leaves_hash_empty() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("state/constructions"));
        let entry = QueueEntry {
            priority: 1,
            name: "fresh".to_string(),
            spec_ref: "spec/fresh.md".to_string(),
            status: ConstructionStatus::NotStarted,
            position: 0,
        };
        let record = store.ensure(&entry, dir.path()).unwrap();
        assert!(record.spec_hash.is_none());
    }

    #[test]
    fn test_record_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path().to_path_buf());
        let entry = QueueEntry {
            priority: 5,
            name: "round-trip".to_string(),
            spec_ref: "spec/rt.md".to_string(),
            status: ConstructionStatus::Formalized,
            position: 3,
        };
        let mut record = store.ensure(&entry, dir.path()).unwrap();
        record.status = ConstructionStatus::Blocked;
        record.revision_count = 3;
        record.next_phase = PhaseKind::Prove;
        store.save(&record).unwrap();

        let loaded = store.load("round-trip").unwrap().unwrap();
        assert_eq!(loaded.status, ConstructionStatus::Blocked);
        assert_eq!(loaded.revision_count, 3);
        assert_eq!(loaded.next_phase, PhaseKind::Prove);
        assert_eq!(loaded.id, record.id);
    }

    #[test]
    fn test_record_names_are_validated() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path().to_path_buf());
        assert!(store.load("../escape").is_err());
        assert!(store.load("has space").is_err());
        assert!(store.load("ok_name-2").unwrap().is_none());
    }

    #[test]
    fn test_spec_hash_is_stable_and_short() {
        let h1 = compute_spec_hash("content");
        let h2 = compute_spec_hash("content");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 12);
        assert_ne!(compute_spec_hash("other"), h1);
    }
}
