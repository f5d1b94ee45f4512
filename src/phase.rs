//! Phase registry for the proof pipeline.
//!
//! This module provides:
//! - `PhaseKind` — the closed, ordered set of pipeline phases
//! - `PhaseRules` — per-phase action categories and resource-class rules
//! - `ResourceClass` — the governed resource classes and their path patterns
//! - `ConstructionStatus` — queue-visible lifecycle states
//!
//! The registry is a pure lookup table. Phases are a closed enum, so an
//! unrecognized phase name is a parse error at the boundary rather than a
//! runtime fallthrough.

use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

/// The seven pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    /// Gather known results and prior art into survey notes
    Survey,
    /// Write the precise claim statement
    Specify,
    /// Develop the informal mathematical argument
    Construct,
    /// Transcribe the argument into proof skeletons with placeholders
    Formalize,
    /// Replace every placeholder with a checked proof
    Prove,
    /// Verify the proof artifacts against the oracle
    Audit,
    /// Record the outcome in the journal
    Log,
}

impl PhaseKind {
    /// All phases in pipeline order.
    pub const ALL: [PhaseKind; 7] = [
        PhaseKind::Survey,
        PhaseKind::Specify,
        PhaseKind::Construct,
        PhaseKind::Formalize,
        PhaseKind::Prove,
        PhaseKind::Audit,
        PhaseKind::Log,
    ];

    /// Zero-based position in pipeline order.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Phase at a given position, if in range.
    pub fn from_index(index: usize) -> Option<PhaseKind> {
        PhaseKind::ALL.get(index).copied()
    }

    /// The phase that follows this one, or `None` after the final phase.
    pub fn next(self) -> Option<PhaseKind> {
        PhaseKind::from_index(self.index() + 1)
    }

    /// Lowercase name used in file paths, records, and CLI verbs.
    pub fn name(self) -> &'static str {
        match self {
            PhaseKind::Survey => "survey",
            PhaseKind::Specify => "specify",
            PhaseKind::Construct => "construct",
            PhaseKind::Formalize => "formalize",
            PhaseKind::Prove => "prove",
            PhaseKind::Audit => "audit",
            PhaseKind::Log => "log",
        }
    }

    /// Capitalized name for terminal headers.
    pub fn label(self) -> &'static str {
        match self {
            PhaseKind::Survey => "Survey",
            PhaseKind::Specify => "Specify",
            PhaseKind::Construct => "Construct",
            PhaseKind::Formalize => "Formalize",
            PhaseKind::Prove => "Prove",
            PhaseKind::Audit => "Audit",
            PhaseKind::Log => "Log",
        }
    }

    /// One-line statement of what the phase must accomplish, used in
    /// agent prompts.
    pub fn objective(self) -> &'static str {
        match self {
            PhaseKind::Survey => {
                "Collect known results, definitions, and relevant prior art into survey notes"
            }
            PhaseKind::Specify => {
                "Write a precise, self-contained statement of the claim and its hypotheses"
            }
            PhaseKind::Construct => "Develop the informal mathematical argument in full detail",
            PhaseKind::Formalize => {
                "Transcribe the argument into proof skeletons with placeholder proof bodies"
            }
            PhaseKind::Prove => "Replace every placeholder with a complete machine-checkable proof",
            PhaseKind::Audit => {
                "Run the verification check and confirm no placeholders or unsound declarations remain"
            }
            PhaseKind::Log => "Record the outcome, method, and lessons learned in the journal",
        }
    }

    /// Resource class that must already hold artifacts before this phase
    /// may start. Absence is a `MissingArtifact` failure.
    pub fn required_artifact(self) -> Option<ResourceClass> {
        match self {
            PhaseKind::Survey => None,
            PhaseKind::Specify => Some(ResourceClass::Survey),
            PhaseKind::Construct => Some(ResourceClass::Specification),
            PhaseKind::Formalize => Some(ResourceClass::Construction),
            PhaseKind::Prove => Some(ResourceClass::Proof),
            PhaseKind::Audit => Some(ResourceClass::Proof),
            PhaseKind::Log => Some(ResourceClass::Proof),
        }
    }

    /// Status a construction takes when this phase succeeds. `None` means
    /// the status is left untouched (survey produces context, not a
    /// lifecycle transition).
    pub fn status_on_success(self) -> Option<ConstructionStatus> {
        match self {
            PhaseKind::Survey => None,
            PhaseKind::Specify => Some(ConstructionStatus::Specified),
            PhaseKind::Construct => Some(ConstructionStatus::Constructed),
            PhaseKind::Formalize => Some(ConstructionStatus::Formalized),
            PhaseKind::Prove => Some(ConstructionStatus::Proved),
            PhaseKind::Audit => Some(ConstructionStatus::Audited),
            PhaseKind::Log => Some(ConstructionStatus::Done),
        }
    }

    /// Action categories and resource rules in force while this phase runs.
    pub fn rules(self) -> PhaseRules {
        match self {
            PhaseKind::Survey => PhaseRules {
                writable: &[ResourceClass::Survey],
                read_only: &[
                    ResourceClass::Specification,
                    ResourceClass::Construction,
                    ResourceClass::Proof,
                    ResourceClass::Journal,
                ],
                categories: ALL_CATEGORIES,
                placeholder_only: false,
            },
            PhaseKind::Specify => PhaseRules {
                writable: &[ResourceClass::Specification],
                read_only: &[
                    ResourceClass::Survey,
                    ResourceClass::Construction,
                    ResourceClass::Proof,
                    ResourceClass::Journal,
                ],
                categories: ALL_CATEGORIES,
                placeholder_only: false,
            },
            PhaseKind::Construct => PhaseRules {
                writable: &[ResourceClass::Construction],
                read_only: &[
                    ResourceClass::Survey,
                    ResourceClass::Specification,
                    ResourceClass::Proof,
                    ResourceClass::Journal,
                ],
                categories: ALL_CATEGORIES,
                placeholder_only: false,
            },
            PhaseKind::Formalize => PhaseRules {
                writable: &[ResourceClass::Proof],
                read_only: &[
                    ResourceClass::Survey,
                    ResourceClass::Specification,
                    ResourceClass::Construction,
                    ResourceClass::Journal,
                ],
                categories: ALL_CATEGORIES,
                placeholder_only: true,
            },
            PhaseKind::Prove => PhaseRules {
                writable: &[ResourceClass::Proof],
                read_only: &[
                    ResourceClass::Survey,
                    ResourceClass::Specification,
                    ResourceClass::Construction,
                    ResourceClass::Journal,
                ],
                categories: ALL_CATEGORIES,
                placeholder_only: false,
            },
            PhaseKind::Audit => PhaseRules {
                writable: &[],
                read_only: &[
                    ResourceClass::Survey,
                    ResourceClass::Specification,
                    ResourceClass::Construction,
                    ResourceClass::Proof,
                    ResourceClass::Journal,
                ],
                categories: EXECUTE_ONLY,
                placeholder_only: false,
            },
            PhaseKind::Log => PhaseRules {
                writable: &[ResourceClass::Journal],
                read_only: &[
                    ResourceClass::Survey,
                    ResourceClass::Specification,
                    ResourceClass::Construction,
                    ResourceClass::Proof,
                ],
                categories: ALL_CATEGORIES,
                placeholder_only: false,
            },
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for PhaseKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "survey" => Ok(PhaseKind::Survey),
            "specify" => Ok(PhaseKind::Specify),
            "construct" => Ok(PhaseKind::Construct),
            "formalize" => Ok(PhaseKind::Formalize),
            "prove" => Ok(PhaseKind::Prove),
            "audit" => Ok(PhaseKind::Audit),
            "log" => Ok(PhaseKind::Log),
            _ => anyhow::bail!(
                "Invalid phase '{}'. Valid values: survey, specify, construct, formalize, prove, audit, log",
                s
            ),
        }
    }
}

/// Action categories an actor may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    CreateResource,
    ModifyResource,
    ExecuteCommand,
}

impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionCategory::CreateResource => "create_resource",
            ActionCategory::ModifyResource => "modify_resource",
            ActionCategory::ExecuteCommand => "execute_command",
        };
        write!(f, "{}", s)
    }
}

const ALL_CATEGORIES: &[ActionCategory] = &[
    ActionCategory::CreateResource,
    ActionCategory::ModifyResource,
    ActionCategory::ExecuteCommand,
];

const EXECUTE_ONLY: &[ActionCategory] = &[ActionCategory::ExecuteCommand];

/// Resource classes governed by phase rules. Paths are matched against
/// each class pattern relative to the project directory; paths matching
/// no class are scratch space and carry no lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Survey,
    Specification,
    Construction,
    Proof,
    Journal,
}

impl ResourceClass {
    /// All governed classes.
    pub const ALL: [ResourceClass; 5] = [
        ResourceClass::Survey,
        ResourceClass::Specification,
        ResourceClass::Construction,
        ResourceClass::Proof,
        ResourceClass::Journal,
    ];

    /// Directory that roots this class inside the project.
    pub fn dir(self) -> &'static str {
        match self {
            ResourceClass::Survey => "survey",
            ResourceClass::Specification => "spec",
            ResourceClass::Construction => "construction",
            ResourceClass::Proof => "proofs",
            ResourceClass::Journal => "journal",
        }
    }

    /// Glob pattern covering every resource in the class.
    pub fn pattern(self) -> &'static str {
        match self {
            ResourceClass::Survey => "survey/**",
            ResourceClass::Specification => "spec/**",
            ResourceClass::Construction => "construction/**",
            ResourceClass::Proof => "proofs/**",
            ResourceClass::Journal => "journal/**",
        }
    }

    /// Classify a project-relative path, if it falls inside a governed
    /// class.
    pub fn classify(path: &Path) -> Option<ResourceClass> {
        CLASS_PATTERNS
            .iter()
            .find(|(_, pattern)| pattern.matches_path(path))
            .map(|(class, _)| *class)
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceClass::Survey => "survey",
            ResourceClass::Specification => "specification",
            ResourceClass::Construction => "construction",
            ResourceClass::Proof => "proof",
            ResourceClass::Journal => "journal",
        };
        write!(f, "{}", s)
    }
}

static CLASS_PATTERNS: LazyLock<Vec<(ResourceClass, Pattern)>> = LazyLock::new(|| {
    ResourceClass::ALL
        .iter()
        .map(|&class| (class, Pattern::new(class.pattern()).unwrap()))
        .collect()
});

/// Per-phase rule row from the registry table.
#[derive(Debug, Clone, Copy)]
pub struct PhaseRules {
    /// Classes the phase may create or modify
    pub writable: &'static [ResourceClass],
    /// Classes locked read-only while the phase runs
    pub read_only: &'static [ResourceClass],
    /// Action categories the phase accepts at all
    pub categories: &'static [ActionCategory],
    /// Whether writable proof resources are limited to placeholder bodies
    pub placeholder_only: bool,
}

impl PhaseRules {
    pub fn allows(&self, category: ActionCategory) -> bool {
        self.categories.contains(&category)
    }

    pub fn is_read_only(&self, class: ResourceClass) -> bool {
        self.read_only.contains(&class)
    }

    pub fn is_writable(&self, class: ResourceClass) -> bool {
        self.writable.contains(&class)
    }
}

/// Queue-visible lifecycle states of a construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructionStatus {
    #[default]
    NotStarted,
    Specified,
    Constructed,
    Formalized,
    Proved,
    Audited,
    Revision,
    Blocked,
    Done,
}

impl ConstructionStatus {
    /// Whether the scheduler may still pick this construction up.
    pub fn eligible(self) -> bool {
        !matches!(self, ConstructionStatus::Done | ConstructionStatus::Blocked)
    }
}

impl std::fmt::Display for ConstructionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConstructionStatus::NotStarted => "not_started",
            ConstructionStatus::Specified => "specified",
            ConstructionStatus::Constructed => "constructed",
            ConstructionStatus::Formalized => "formalized",
            ConstructionStatus::Proved => "proved",
            ConstructionStatus::Audited => "audited",
            ConstructionStatus::Revision => "revision",
            ConstructionStatus::Blocked => "blocked",
            ConstructionStatus::Done => "done",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ConstructionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "not_started" => Ok(ConstructionStatus::NotStarted),
            "specified" => Ok(ConstructionStatus::Specified),
            "constructed" => Ok(ConstructionStatus::Constructed),
            "formalized" => Ok(ConstructionStatus::Formalized),
            "proved" => Ok(ConstructionStatus::Proved),
            "audited" => Ok(ConstructionStatus::Audited),
            "revision" => Ok(ConstructionStatus::Revision),
            "blocked" => Ok(ConstructionStatus::Blocked),
            "done" => Ok(ConstructionStatus::Done),
            _ => anyhow::bail!("Invalid construction status '{}'", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    // =========================================
    // Phase order tests
    // =========================================

    #[test]
    fn test_phase_order_is_stable() {
        assert_eq!(PhaseKind::ALL.len(), 7);
        assert_eq!(PhaseKind::Survey.index(), 0);
        assert_eq!(PhaseKind::Log.index(), 6);

        for (i, phase) in PhaseKind::ALL.iter().enumerate() {
            assert_eq!(phase.index(), i);
            assert_eq!(PhaseKind::from_index(i), Some(*phase));
        }
        assert_eq!(PhaseKind::from_index(7), None);
    }

    #[test]
    fn test_phase_next_chains_to_log() {
        assert_eq!(PhaseKind::Survey.next(), Some(PhaseKind::Specify));
        assert_eq!(PhaseKind::Specify.next(), Some(PhaseKind::Construct));
        assert_eq!(PhaseKind::Construct.next(), Some(PhaseKind::Formalize));
        assert_eq!(PhaseKind::Formalize.next(), Some(PhaseKind::Prove));
        assert_eq!(PhaseKind::Prove.next(), Some(PhaseKind::Audit));
        assert_eq!(PhaseKind::Audit.next(), Some(PhaseKind::Log));
        assert_eq!(PhaseKind::Log.next(), None);
    }

    #[test]
    fn test_phase_from_str() {
        assert_eq!("survey".parse::<PhaseKind>().unwrap(), PhaseKind::Survey);
        assert_eq!("PROVE".parse::<PhaseKind>().unwrap(), PhaseKind::Prove);
        assert_eq!("Audit".parse::<PhaseKind>().unwrap(), PhaseKind::Audit);

        let result = "deploy".parse::<PhaseKind>();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid phase"));
    }

    #[test]
    fn test_phase_serde_lowercase() {
        let json = serde_json::to_string(&PhaseKind::Formalize).unwrap();
        assert_eq!(json, "\"formalize\"");
        let parsed: PhaseKind = serde_json::from_str("\"prove\"").unwrap();
        assert_eq!(parsed, PhaseKind::Prove);
    }

    // =========================================
    // Rule table tests
    // =========================================

    #[test]
    fn test_rules_audit_is_execute_only() {
        let rules = PhaseKind::Audit.rules();
        assert!(rules.writable.is_empty());
        assert!(!rules.allows(ActionCategory::CreateResource));
        assert!(!rules.allows(ActionCategory::ModifyResource));
        assert!(rules.allows(ActionCategory::ExecuteCommand));
        for class in ResourceClass::ALL {
            assert!(rules.is_read_only(class));
        }
    }

    #[test]
    fn test_rules_formalize_placeholder_only() {
        assert!(PhaseKind::Formalize.rules().placeholder_only);
        assert!(!PhaseKind::Prove.rules().placeholder_only);
        assert!(!PhaseKind::Survey.rules().placeholder_only);
    }

    #[test]
    fn test_rules_every_class_is_either_writable_or_read_only() {
        for phase in PhaseKind::ALL {
            let rules = phase.rules();
            for class in ResourceClass::ALL {
                let writable = rules.is_writable(class);
                let read_only = rules.is_read_only(class);
                assert!(
                    writable != read_only,
                    "{} must classify {} exactly once",
                    phase,
                    class
                );
            }
        }
    }

    #[test]
    fn test_rules_prove_writes_proofs_not_spec() {
        let rules = PhaseKind::Prove.rules();
        assert!(rules.is_writable(ResourceClass::Proof));
        assert!(rules.is_read_only(ResourceClass::Specification));
        assert!(rules.is_read_only(ResourceClass::Construction));
    }

    #[test]
    fn test_required_artifact_chain() {
        assert_eq!(PhaseKind::Survey.required_artifact(), None);
        assert_eq!(
            PhaseKind::Specify.required_artifact(),
            Some(ResourceClass::Survey)
        );
        assert_eq!(
            PhaseKind::Construct.required_artifact(),
            Some(ResourceClass::Specification)
        );
        assert_eq!(
            PhaseKind::Formalize.required_artifact(),
            Some(ResourceClass::Construction)
        );
        assert_eq!(
            PhaseKind::Audit.required_artifact(),
            Some(ResourceClass::Proof)
        );
        assert_eq!(
            PhaseKind::Log.required_artifact(),
            Some(ResourceClass::Proof)
        );
    }

    #[test]
    fn test_status_on_success() {
        assert_eq!(PhaseKind::Survey.status_on_success(), None);
        assert_eq!(
            PhaseKind::Specify.status_on_success(),
            Some(ConstructionStatus::Specified)
        );
        assert_eq!(
            PhaseKind::Log.status_on_success(),
            Some(ConstructionStatus::Done)
        );
    }

    // =========================================
    // Resource classification tests
    // =========================================

    #[test]
    fn test_classify_governed_paths() {
        assert_eq!(
            ResourceClass::classify(Path::new("survey/notes.md")),
            Some(ResourceClass::Survey)
        );
        assert_eq!(
            ResourceClass::classify(Path::new("spec/cauchy_schwarz.md")),
            Some(ResourceClass::Specification)
        );
        assert_eq!(
            ResourceClass::classify(Path::new("construction/argument.md")),
            Some(ResourceClass::Construction)
        );
        assert_eq!(
            ResourceClass::classify(Path::new("proofs/CauchySchwarz/Basic.lean")),
            Some(ResourceClass::Proof)
        );
        assert_eq!(
            ResourceClass::classify(Path::new("journal/2026-08.md")),
            Some(ResourceClass::Journal)
        );
    }

    #[test]
    fn test_classify_scratch_paths_are_unclassified() {
        assert_eq!(ResourceClass::classify(Path::new("scratch/tmp.txt")), None);
        assert_eq!(ResourceClass::classify(Path::new("README.md")), None);
        assert_eq!(
            ResourceClass::classify(Path::new("specifics/notes.md")),
            None
        );
    }

    #[test]
    fn test_class_dirs_are_distinct() {
        let mut dirs: Vec<&str> = ResourceClass::ALL.iter().map(|c| c.dir()).collect();
        dirs.sort_unstable();
        dirs.dedup();
        assert_eq!(dirs.len(), ResourceClass::ALL.len());
    }

    // =========================================
    // Construction status tests
    // =========================================

    #[test]
    fn test_status_display_round_trip() {
        let statuses = [
            ConstructionStatus::NotStarted,
            ConstructionStatus::Specified,
            ConstructionStatus::Constructed,
            ConstructionStatus::Formalized,
            ConstructionStatus::Proved,
            ConstructionStatus::Audited,
            ConstructionStatus::Revision,
            ConstructionStatus::Blocked,
            ConstructionStatus::Done,
        ];
        for status in statuses {
            let parsed: ConstructionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_eligibility() {
        assert!(ConstructionStatus::NotStarted.eligible());
        assert!(ConstructionStatus::Revision.eligible());
        assert!(!ConstructionStatus::Blocked.eligible());
        assert!(!ConstructionStatus::Done.eligible());
    }

    #[test]
    fn test_status_default_is_not_started() {
        assert_eq!(
            ConstructionStatus::default(),
            ConstructionStatus::NotStarted
        );
    }
}
