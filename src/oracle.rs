//! Verification oracle.
//!
//! Soundness of a proof is never self-reported. The oracle combines two
//! independent checks:
//! - the configured check command (`lake build` by default), run from the
//!   project directory, whose exit code is the pass/fail verdict
//! - a scan of the proof artifacts for placeholders and forbidden tokens
//!
//! Phase completion in Audit requires both to come back clean. The scan
//! half is also available on its own for read-only status reporting.

use crate::policy::tokens;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use walkdir::WalkDir;

/// Placeholder and forbidden-token counts across the proof artifacts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactScan {
    pub placeholder_count: usize,
    pub forbidden_count: usize,
    pub files_scanned: usize,
}

impl ArtifactScan {
    pub fn clean(&self) -> bool {
        self.placeholder_count == 0 && self.forbidden_count == 0
    }
}

/// Outcome of a full verification run.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// Check command exited 0
    pub passed: bool,
    pub scan: ArtifactScan,
    /// Tail of the check command output, populated on failure
    pub detail: String,
}

impl VerificationReport {
    /// The Audit postcondition: command passed and artifacts are clean.
    pub fn is_sound(&self) -> bool {
        self.passed && self.scan.clean()
    }

    pub fn summary(&self) -> String {
        if self.is_sound() {
            return "verification passed".to_string();
        }
        let mut parts = Vec::new();
        if !self.passed {
            parts.push(format!("check command failed: {}", self.detail.trim()));
        }
        if self.scan.placeholder_count > 0 {
            parts.push(format!(
                "{} placeholder(s) remain in proof artifacts",
                self.scan.placeholder_count
            ));
        }
        if self.scan.forbidden_count > 0 {
            parts.push(format!(
                "{} forbidden token(s) in proof artifacts",
                self.scan.forbidden_count
            ));
        }
        parts.join("; ")
    }
}

/// Walk the proof directory and count placeholders and forbidden tokens.
/// A missing directory scans as empty; non-text files are skipped.
pub fn scan_proof_dir(proof_dir: &Path) -> Result<ArtifactScan> {
    let mut scan = ArtifactScan::default();
    if !proof_dir.exists() {
        return Ok(scan);
    }

    for entry in WalkDir::new(proof_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        scan.placeholder_count += tokens::count_placeholders(&content);
        scan.forbidden_count += tokens::count_forbidden_tokens(&content);
        scan.files_scanned += 1;
    }

    Ok(scan)
}

#[async_trait]
pub trait VerificationOracle: Send + Sync {
    async fn verify(&self) -> Result<VerificationReport>;
}

/// Production oracle: shells out to the configured check command and
/// scans the proof directory.
pub struct CheckOracle {
    project_dir: PathBuf,
    proof_dir: PathBuf,
    check_cmd: String,
    timeout_secs: u64,
}

impl CheckOracle {
    pub fn new(
        project_dir: impl AsRef<Path>,
        proof_dir: impl AsRef<Path>,
        check_cmd: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let project_dir = project_dir.as_ref().to_path_buf();
        let proof_dir = proof_dir.as_ref().to_path_buf();
        let proof_dir = if proof_dir.is_absolute() {
            proof_dir
        } else {
            project_dir.join(proof_dir)
        };
        Self {
            project_dir,
            proof_dir,
            check_cmd: check_cmd.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl VerificationOracle for CheckOracle {
    async fn verify(&self) -> Result<VerificationReport> {
        tracing::info!(command = %self.check_cmd, "Running verification check");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.check_cmd)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn check command: {}", self.check_cmd))?;

        let timeout_duration = Duration::from_secs(self.timeout_secs);
        let (passed, detail) = match timeout(timeout_duration, child.wait_with_output()).await {
            Ok(result) => {
                let output = result.context("Failed to wait for check command")?;
                if output.status.success() {
                    (true, String::new())
                } else {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    (false, tail(&format!("{}\n{}", stdout, stderr), 2000))
                }
            }
            Err(_) => (
                false,
                format!(
                    "check command timed out after {} seconds",
                    self.timeout_secs
                ),
            ),
        };

        let scan = scan_proof_dir(&self.proof_dir)?;
        tracing::info!(
            passed,
            placeholders = scan.placeholder_count,
            forbidden = scan.forbidden_count,
            "Verification check finished"
        );

        Ok(VerificationReport {
            passed,
            scan,
            detail,
        })
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max_chars {
        return trimmed.to_string();
    }
    let start = trimmed.len() - max_chars;
    // avoid slicing inside a multi-byte character
    let start = (start..trimmed.len())
        .find(|i| trimmed.is_char_boundary(*i))
        .unwrap_or(trimmed.len());
    trimmed[start..].to_string()
}
