//! Durable resource lock manager.
//!
//! The canonical lock table lives in `.crucible/locks.json`; every
//! mutation is written through before returning, so a restriction
//! survives process restart or crash. The manager is a stateless handle:
//! it holds only the file path and re-reads the table on every call.
//!
//! `PhaseLockGuard` scopes a phase's locks: acquiring it applies the
//! phase's rule row to the table, and dropping it (normal return, unwind,
//! or cancellation of the owning future) releases the classes it locked.

use crate::phase::{PhaseKind, ResourceClass};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Write capability of a resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Writable,
    ReadOnly,
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockState::Writable => write!(f, "writable"),
            LockState::ReadOnly => write!(f, "read_only"),
        }
    }
}

/// One row of the lock table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEntry {
    pub state: LockState,
    /// Phase whose entry placed this lock
    pub entered_phase: PhaseKind,
    pub locked_at: DateTime<Utc>,
}

/// The durable table: resource class to lock entry. Absent classes are
/// writable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockTable {
    #[serde(default)]
    pub entries: HashMap<ResourceClass, LockEntry>,
}

impl LockTable {
    /// Current state of a class; absent means writable.
    pub fn state_of(&self, class: ResourceClass) -> LockState {
        self.entries
            .get(&class)
            .map(|entry| entry.state)
            .unwrap_or(LockState::Writable)
    }
}

#[derive(Debug, Clone)]
pub struct LockManager {
    locks_file: PathBuf,
}

impl LockManager {
    pub fn new(locks_file: PathBuf) -> Self {
        Self { locks_file }
    }

    fn read_table(&self) -> Result<LockTable> {
        if !self.locks_file.exists() {
            return Ok(LockTable::default());
        }
        let content = fs::read_to_string(&self.locks_file)
            .with_context(|| format!("Failed to read lock table: {}", self.locks_file.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse lock table: {}", self.locks_file.display()))
    }

    fn write_table(&self, table: &LockTable) -> Result<()> {
        let content =
            serde_json::to_string_pretty(table).context("Failed to serialize lock table")?;
        fs::write(&self.locks_file, content).with_context(|| {
            format!("Failed to write lock table: {}", self.locks_file.display())
        })?;
        Ok(())
    }

    /// Revoke write capability for the given classes. Locking an
    /// already-locked class is idempotent.
    pub fn lock(&self, classes: &[ResourceClass], phase: PhaseKind) -> Result<()> {
        let mut table = self.read_table()?;
        for &class in classes {
            table.entries.insert(
                class,
                LockEntry {
                    state: LockState::ReadOnly,
                    entered_phase: phase,
                    locked_at: Utc::now(),
                },
            );
        }
        self.write_table(&table)
    }

    /// Restore write capability for the given classes.
    pub fn unlock(&self, classes: &[ResourceClass]) -> Result<()> {
        let mut table = self.read_table()?;
        for class in classes {
            table.entries.remove(class);
        }
        self.write_table(&table)
    }

    /// Drop every lock in the table.
    pub fn unlock_all(&self) -> Result<()> {
        self.write_table(&LockTable::default())
    }

    /// Rewrite the table to match a phase's rule row: its read-only
    /// classes lock, its writable classes unlock.
    pub fn apply_phase(&self, phase: PhaseKind) -> Result<()> {
        let rules = phase.rules();
        let mut table = self.read_table()?;
        for &class in rules.writable {
            table.entries.remove(&class);
        }
        for &class in rules.read_only {
            table.entries.insert(
                class,
                LockEntry {
                    state: LockState::ReadOnly,
                    entered_phase: phase,
                    locked_at: Utc::now(),
                },
            );
        }
        self.write_table(&table)
    }

    /// Whether a project-relative path may be written right now.
    /// Paths outside every governed class carry no lock state.
    pub fn is_writable(&self, path: &Path) -> Result<bool> {
        let Some(class) = ResourceClass::classify(path) else {
            return Ok(true);
        };
        Ok(self.read_table()?.state_of(class) == LockState::Writable)
    }

    /// Current table for status introspection.
    pub fn snapshot(&self) -> Result<LockTable> {
        self.read_table()
    }
}

/// Scoped lock acquisition for one phase execution.
///
/// Dropping the guard releases the classes it locked, including on unwind
/// and when the owning future is cancelled. `release` is the explicit
/// path that can report an unlock failure.
pub struct PhaseLockGuard {
    manager: LockManager,
    classes: Vec<ResourceClass>,
    released: bool,
}

impl PhaseLockGuard {
    pub fn acquire(manager: &LockManager, phase: PhaseKind) -> Result<Self> {
        manager.apply_phase(phase)?;
        Ok(Self {
            manager: manager.clone(),
            classes: phase.rules().read_only.to_vec(),
            released: false,
        })
    }

    /// Release now and surface any error. Consumes the guard.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.manager.unlock(&self.classes)
    }
}

impl Drop for PhaseLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.manager.unlock(&self.classes) {
            tracing::warn!(error = %err, "Failed to release resource locks on drop");
        }
    }
}
