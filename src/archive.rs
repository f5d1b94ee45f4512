//! Archival sink for finished constructions.
//!
//! On Done, the specification, construction documents, and proof
//! artifacts are copied under `.crucible/results/<name>/`, with a
//! manifest echoing the spec digest. Nothing is deleted from the
//! project tree; the archive is a snapshot, not a move.

use crate::phase::ResourceClass;
use crate::queue::ConstructionRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub construction: String,
    pub id: Uuid,
    pub spec_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_hash: Option<String>,
    pub revision_count: u32,
    pub archived_at: DateTime<Utc>,
    pub files: Vec<PathBuf>,
}

pub struct Archiver {
    project_dir: PathBuf,
    results_dir: PathBuf,
}

impl Archiver {
    pub fn new(project_dir: impl AsRef<Path>, results_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
            results_dir: results_dir.as_ref().to_path_buf(),
        }
    }

    /// Snapshot a finished construction. Returns the archive directory.
    pub fn archive(&self, record: &ConstructionRecord) -> Result<PathBuf> {
        let dest = self.results_dir.join(&record.name);
        fs::create_dir_all(&dest).with_context(|| {
            format!("Failed to create archive directory: {}", dest.display())
        })?;

        let mut files = Vec::new();
        self.copy_file(Path::new(&record.spec_ref), &dest, &mut files)?;
        for class in [ResourceClass::Construction, ResourceClass::Proof] {
            self.copy_tree(Path::new(class.dir()), &dest, &mut files)?;
        }

        let manifest = ArchiveManifest {
            construction: record.name.clone(),
            id: record.id,
            spec_ref: record.spec_ref.clone(),
            spec_hash: record.spec_hash.clone(),
            revision_count: record.revision_count,
            archived_at: Utc::now(),
            files,
        };
        let json = serde_json::to_string_pretty(&manifest)
            .context("Failed to serialize archive manifest")?;
        fs::write(dest.join("manifest.json"), json)
            .context("Failed to write archive manifest")?;

        tracing::info!(
            construction = %record.name,
            archive = %dest.display(),
            files = manifest.files.len(),
            "Archived construction"
        );
        Ok(dest)
    }

    fn copy_file(&self, rel: &Path, dest: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        let source = self.project_dir.join(rel);
        if !source.is_file() {
            return Ok(());
        }
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::copy(&source, &target)
            .with_context(|| format!("Failed to archive {}", rel.display()))?;
        files.push(rel.to_path_buf());
        Ok(())
    }

    fn copy_tree(&self, rel_dir: &Path, dest: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        let source_dir = self.project_dir.join(rel_dir);
        if !source_dir.is_dir() {
            return Ok(());
        }
        for entry in WalkDir::new(&source_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.project_dir)
                .context("Archive walk escaped the project directory")?;
            self.copy_file(rel, dest, files)?;
        }
        Ok(())
    }
}
