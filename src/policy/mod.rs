//! Action policy engine.
//!
//! `evaluate` is a pure function from (current phase, requested action) to
//! an allow/deny decision. It has no side effects and must be consulted
//! before any requested action reaches storage; callers act on the
//! decision and surface the denial reason to the actor verbatim.
//!
//! Decision order:
//! 1. forbidden tokens in create/modify payloads
//! 2. path escape (absolute or `..` targets), any phase
//! 3. category gate from the phase registry
//! 4. create/modify: read-only class conflicts, then content rules
//! 5. execute: destructive patterns, then the command-text token scan
//!    (attributed to the lock when the command also references a locked
//!    class, so a write smuggled through a shell command reads as the
//!    lock conflict it is)

pub mod tokens;

use crate::errors::PolicyViolation;
use crate::phase::{ActionCategory, PhaseKind, PhaseRules, ResourceClass};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// A single action an actor wants to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Who is asking (agent name or "operator")
    pub actor: String,
    pub category: ActionCategory,
    /// Target resource paths, relative to the project directory. Usually
    /// one for create/modify, none for execute.
    #[serde(default)]
    pub targets: Vec<PathBuf>,
    /// File content for create/modify; command text for execute.
    #[serde(default)]
    pub payload: String,
}

impl ActionRequest {
    pub fn create(actor: &str, target: impl Into<PathBuf>, payload: &str) -> Self {
        Self {
            actor: actor.to_string(),
            category: ActionCategory::CreateResource,
            targets: vec![target.into()],
            payload: payload.to_string(),
        }
    }

    pub fn modify(actor: &str, target: impl Into<PathBuf>, payload: &str) -> Self {
        Self {
            actor: actor.to_string(),
            category: ActionCategory::ModifyResource,
            targets: vec![target.into()],
            payload: payload.to_string(),
        }
    }

    pub fn execute(actor: &str, command: &str) -> Self {
        Self {
            actor: actor.to_string(),
            category: ActionCategory::ExecuteCommand,
            targets: Vec::new(),
            payload: command.to_string(),
        }
    }
}

/// Outcome of a policy evaluation.
#[derive(Debug)]
pub enum PolicyDecision {
    Allow,
    Deny(PolicyViolation),
}

impl PolicyDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }

    /// The violation, if this is a denial.
    pub fn violation(&self) -> Option<&PolicyViolation> {
        match self {
            PolicyDecision::Allow => None,
            PolicyDecision::Deny(violation) => Some(violation),
        }
    }
}

/// Decide whether `request` may proceed while `phase` is executing.
pub fn evaluate(phase: PhaseKind, request: &ActionRequest) -> PolicyDecision {
    let rules = phase.rules();

    // Universal token scan. Execute payloads are scanned below so a
    // command that also touches a locked class is attributed to the lock.
    if request.category != ActionCategory::ExecuteCommand
        && let Some(token) = tokens::find_forbidden_token(&request.payload)
    {
        return PolicyDecision::Deny(PolicyViolation::ForbiddenToken {
            token: token.to_string(),
        });
    }

    for target in &request.targets {
        if escapes_project(target) {
            return PolicyDecision::Deny(PolicyViolation::PathEscape {
                path: target.clone(),
            });
        }
    }

    if !rules.allows(request.category) {
        return PolicyDecision::Deny(PolicyViolation::CategoryNotAllowed {
            category: request.category.to_string(),
            phase: phase.to_string(),
        });
    }

    match request.category {
        ActionCategory::CreateResource | ActionCategory::ModifyResource => {
            for target in &request.targets {
                let Some(class) = ResourceClass::classify(target) else {
                    // scratch space: no lock state, universal rules already ran
                    continue;
                };
                if rules.is_read_only(class) {
                    return PolicyDecision::Deny(PolicyViolation::LockConflict {
                        path: target.clone(),
                        class: class.to_string(),
                    });
                }
                if rules.placeholder_only
                    && class == ResourceClass::Proof
                    && let Some(tactic) = tokens::find_proof_tactic(&request.payload)
                {
                    return PolicyDecision::Deny(PolicyViolation::ContentRule {
                        detail: format!(
                            "proof tactic '{}' is not permitted while formalizing; leave placeholder proof bodies",
                            tactic
                        ),
                    });
                }
            }
        }
        ActionCategory::ExecuteCommand => {
            if let Some(pattern) = tokens::find_destructive_command(&request.payload) {
                return PolicyDecision::Deny(PolicyViolation::DestructiveCommand {
                    pattern: pattern.to_string(),
                });
            }
            if let Some(token) = tokens::find_forbidden_token(&request.payload) {
                if let Some((class, path)) = locked_class_reference(&request.payload, &rules) {
                    return PolicyDecision::Deny(PolicyViolation::LockConflict {
                        path,
                        class: class.to_string(),
                    });
                }
                return PolicyDecision::Deny(PolicyViolation::ForbiddenToken {
                    token: token.to_string(),
                });
            }
        }
    }

    PolicyDecision::Allow
}

/// True when a target path leaves the project directory: absolute, or any
/// `..` component.
fn escapes_project(path: &Path) -> bool {
    path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir))
}

/// Scan command text for a path-like fragment inside a locked class.
fn locked_class_reference(
    payload: &str,
    rules: &PhaseRules,
) -> Option<(ResourceClass, PathBuf)> {
    for raw in payload.split_whitespace() {
        let fragment =
            raw.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | ';' | ',' | '(' | ')' | '>' | '<'));
        if fragment.is_empty() {
            continue;
        }
        let path = Path::new(fragment);
        if let Some(class) = ResourceClass::classify(path)
            && rules.is_read_only(class)
        {
            return Some((class, path.to_path_buf()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_denied(decision: &PolicyDecision) -> &PolicyViolation {
        match decision {
            PolicyDecision::Deny(violation) => violation,
            PolicyDecision::Allow => panic!("Expected denial, got Allow"),
        }
    }

    // =========================================
    // Universal rule tests
    // =========================================

    #[test]
    fn test_forbidden_token_denied_in_every_phase() {
        for phase in PhaseKind::ALL {
            let target = match phase {
                PhaseKind::Survey => "survey/notes.md",
                PhaseKind::Specify => "spec/claim.md",
                PhaseKind::Construct => "construction/argument.md",
                PhaseKind::Formalize | PhaseKind::Prove => "proofs/Claim.lean",
                PhaseKind::Audit | PhaseKind::Log => "journal/entry.md",
            };
            let request = ActionRequest::create("agent", target, "axiom cheat : False");
            let decision = evaluate(phase, &request);
            let violation = assert_denied(&decision);
            assert!(
                matches!(violation, PolicyViolation::ForbiddenToken { token } if token == "axiom"),
                "{} should deny the forbidden token, got: {}",
                phase,
                violation
            );
        }
    }

    #[test]
    fn test_forbidden_token_case_evasion_is_denied() {
        let request = ActionRequest::create("agent", "proofs/X.lean", "AXIOM cheat : False");
        assert!(!evaluate(PhaseKind::Prove, &request).is_allow());
    }

    #[test]
    fn test_path_escape_denied() {
        let request = ActionRequest::create("agent", "../outside.md", "notes");
        let decision = evaluate(PhaseKind::Survey, &request);
        assert!(matches!(
            assert_denied(&decision),
            PolicyViolation::PathEscape { .. }
        ));

        let request = ActionRequest::create("agent", "/etc/passwd", "x");
        let decision = evaluate(PhaseKind::Survey, &request);
        assert!(matches!(
            assert_denied(&decision),
            PolicyViolation::PathEscape { .. }
        ));

        let request = ActionRequest::create("agent", "survey/../spec/claim.md", "x");
        let decision = evaluate(PhaseKind::Survey, &request);
        assert!(matches!(
            assert_denied(&decision),
            PolicyViolation::PathEscape { .. }
        ));
    }

    // =========================================
    // Category and class rule tests
    // =========================================

    #[test]
    fn test_audit_denies_writes_allows_execute() {
        let write = ActionRequest::create("agent", "proofs/X.lean", "theorem t : True := by sorry");
        let decision = evaluate(PhaseKind::Audit, &write);
        assert!(matches!(
            assert_denied(&decision),
            PolicyViolation::CategoryNotAllowed { .. }
        ));

        let check = ActionRequest::execute("agent", "lake build");
        assert!(evaluate(PhaseKind::Audit, &check).is_allow());
    }

    #[test]
    fn test_read_only_class_write_is_lock_conflict() {
        // every phase denies writes to each class it marks read-only
        for phase in PhaseKind::ALL {
            let rules = phase.rules();
            if !rules.allows(ActionCategory::ModifyResource) {
                continue;
            }
            for class in rules.read_only {
                let target = format!("{}/artifact.md", class.dir());
                let request = ActionRequest::modify("agent", target, "harmless content");
                let decision = evaluate(phase, &request);
                assert!(
                    matches!(
                        assert_denied(&decision),
                        PolicyViolation::LockConflict { .. }
                    ),
                    "{} should lock {}",
                    phase,
                    class
                );
            }
        }
    }

    #[test]
    fn test_writable_class_is_allowed() {
        let request = ActionRequest::create("agent", "survey/notes.md", "known results");
        assert!(evaluate(PhaseKind::Survey, &request).is_allow());

        let request = ActionRequest::modify("agent", "proofs/X.lean", "theorem t : True := trivial");
        assert!(evaluate(PhaseKind::Prove, &request).is_allow());

        let request = ActionRequest::create("agent", "journal/2026-08.md", "proved it");
        assert!(evaluate(PhaseKind::Log, &request).is_allow());
    }

    #[test]
    fn test_scratch_paths_are_writable_in_any_writing_phase() {
        let request = ActionRequest::create("agent", "scratch/working.md", "draft");
        assert!(evaluate(PhaseKind::Survey, &request).is_allow());
        assert!(evaluate(PhaseKind::Prove, &request).is_allow());
        // but scratch content is still token-scanned
        let request = ActionRequest::create("agent", "scratch/working.md", "axiom x : P");
        assert!(!evaluate(PhaseKind::Prove, &request).is_allow());
    }

    // =========================================
    // Content rule tests
    // =========================================

    #[test]
    fn test_formalize_denies_real_tactics_in_proofs() {
        let request = ActionRequest::modify(
            "agent",
            "proofs/Claim.lean",
            "theorem t : 1 + 1 = 2 := by simp",
        );
        let decision = evaluate(PhaseKind::Formalize, &request);
        let violation = assert_denied(&decision);
        assert!(
            matches!(violation, PolicyViolation::ContentRule { detail } if detail.contains("simp"))
        );
    }

    #[test]
    fn test_formalize_allows_placeholder_bodies() {
        let request = ActionRequest::modify(
            "agent",
            "proofs/Claim.lean",
            "theorem t : 1 + 1 = 2 := by sorry",
        );
        assert!(evaluate(PhaseKind::Formalize, &request).is_allow());
    }

    #[test]
    fn test_prove_allows_real_tactics() {
        let request = ActionRequest::modify(
            "agent",
            "proofs/Claim.lean",
            "theorem t : 1 + 1 = 2 := by norm_num",
        );
        assert!(evaluate(PhaseKind::Prove, &request).is_allow());
    }

    #[test]
    fn test_formalize_tactic_rule_only_governs_proof_class() {
        // statements about tactics in scratch notes are fine
        let request = ActionRequest::create("agent", "scratch/plan.md", "later we will use simp");
        assert!(evaluate(PhaseKind::Formalize, &request).is_allow());
    }

    // =========================================
    // Command rule tests
    // =========================================

    #[test]
    fn test_destructive_commands_denied() {
        for command in [
            "sudo lake build",
            "git rebase -i HEAD~3",
            "chmod 777 proofs",
        ] {
            let request = ActionRequest::execute("agent", command);
            let decision = evaluate(PhaseKind::Prove, &request);
            assert!(
                matches!(
                    assert_denied(&decision),
                    PolicyViolation::DestructiveCommand { .. }
                ),
                "should deny: {}",
                command
            );
        }
    }

    #[test]
    fn test_command_token_with_locked_path_is_lock_conflict() {
        // a write smuggled through the shell into a locked class
        let request =
            ActionRequest::execute("agent", "echo 'axiom cheat : False' >> spec/claim.md");
        let decision = evaluate(PhaseKind::Prove, &request);
        let violation = assert_denied(&decision);
        assert!(
            matches!(violation, PolicyViolation::LockConflict { class, .. } if class == "specification")
        );
    }

    #[test]
    fn test_command_token_without_path_is_still_denied() {
        // no path reference, the token scan alone catches it
        let request = ActionRequest::execute("agent", "echo axiom");
        let decision = evaluate(PhaseKind::Prove, &request);
        assert!(matches!(
            assert_denied(&decision),
            PolicyViolation::ForbiddenToken { token } if token == "axiom"
        ));
    }

    #[test]
    fn test_benign_commands_allowed() {
        for command in ["lake build", "grep -rn lemma proofs/", "ls construction"] {
            let request = ActionRequest::execute("agent", command);
            assert!(
                evaluate(PhaseKind::Prove, &request).is_allow(),
                "should allow: {}",
                command
            );
        }
    }

    #[test]
    fn test_command_reading_locked_class_is_allowed() {
        // referencing a locked path without forbidden text is fine
        let request = ActionRequest::execute("agent", "cat spec/claim.md");
        assert!(evaluate(PhaseKind::Prove, &request).is_allow());
    }
}
