//! Durable revision records.
//!
//! Every accepted revision is archived under
//! `.crucible/revisions/<construction>/<seq>.json` before the rollback
//! takes effect, so the full history of why phases were redone survives
//! the records themselves being rewritten.

use crate::phase::PhaseKind;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevisionRecord {
    pub sequence: u32,
    pub construction: String,
    /// Phase that was executing when the flaw was found
    pub raised_in: PhaseKind,
    pub restart_from: PhaseKind,
    pub description: String,
    pub evidence: String,
    pub raised_at: DateTime<Utc>,
}

pub struct RevisionLog {
    revisions_dir: PathBuf,
}

impl RevisionLog {
    pub fn new(revisions_dir: PathBuf) -> Self {
        Self { revisions_dir }
    }

    pub fn archive(&self, record: &RevisionRecord) -> Result<PathBuf> {
        let dir = self.revisions_dir.join(&record.construction);
        fs::create_dir_all(&dir).with_context(|| {
            format!("Failed to create revisions directory: {}", dir.display())
        })?;
        let path = dir.join(format!("{:03}.json", record.sequence));
        let json =
            serde_json::to_string_pretty(record).context("Failed to serialize revision record")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write revision record: {}", path.display()))?;
        Ok(path)
    }

    /// All archived revisions for a construction, in sequence order.
    pub fn list(&self, construction: &str) -> Result<Vec<RevisionRecord>> {
        let dir = self.revisions_dir.join(construction);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = fs::read_to_string(&path).with_context(|| {
                    format!("Failed to read revision record: {}", path.display())
                })?;
                let record: RevisionRecord = serde_json::from_str(&content).with_context(|| {
                    format!("Failed to parse revision record: {}", path.display())
                })?;
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.sequence);
        Ok(records)
    }
}
