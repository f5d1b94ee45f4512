//! Token tables for the policy engine's textual scans.
//!
//! Three scan families:
//! - forbidden tokens — unsound-proof bypasses and history rewriting,
//!   denied in any payload or command text regardless of phase
//! - destructive command patterns — privilege escalation and permission
//!   bit blasting, denied in command text
//! - proof tactics — real proof steps, denied inside proof resources
//!   while the formalize phase is limited to placeholder bodies
//!
//! Matching is case-insensitive and word-boundary anchored. These scans
//! are textual, not semantic; known evasion strings live in the tests as
//! regression cases.

use regex::Regex;
use std::sync::LazyLock;

// Compile regexes once using LazyLock
static FORBIDDEN_TOKENS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        // declaring truth without proof
        ("axiom", r"(?i)\baxiom\b"),
        ("admit", r"(?i)\badmit\b"),
        ("sorryAx", r"(?i)\bsorryax\b"),
        // disabling or forging kernel checking
        ("native_decide", r"(?i)\bnative_decide\b"),
        ("skipKernelTC", r"(?i)\bskipkerneltc\b"),
        // history rewriting
        ("push --force", r"(?i)\bpush\s+(--force|-f)\b"),
        ("filter-branch", r"(?i)\bfilter-branch\b"),
        ("reset --hard", r"(?i)\breset\s+--hard\b"),
        ("--no-verify", r"(?i)--no-verify\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

static DESTRUCTIVE_COMMANDS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("sudo", r"(?i)\bsudo\b"),
        ("doas", r"(?i)\bdoas\b"),
        ("su -", r"(?i)\bsu\s+-"),
        ("git rebase", r"(?i)\bgit\s+rebase\b"),
        ("chmod 777", r"(?i)\bchmod\s+(-[a-z]+\s+)?0?777\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

static PROOF_TACTICS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(exact|apply|simp|rw|rfl|trivial|intros?|induction|cases|constructor|ring|linarith|nlinarith|omega|decide|aesop|norm_num)\b",
    )
    .unwrap()
});

// The one allowed stand-in for an unfinished proof body.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bsorry\b").unwrap());

/// First forbidden token found in the text, by table order.
pub fn find_forbidden_token(text: &str) -> Option<&'static str> {
    FORBIDDEN_TOKENS
        .iter()
        .find(|(_, regex)| regex.is_match(text))
        .map(|(name, _)| *name)
}

/// Total forbidden-token occurrences across all patterns.
pub fn count_forbidden_tokens(text: &str) -> usize {
    FORBIDDEN_TOKENS
        .iter()
        .map(|(_, regex)| regex.find_iter(text).count())
        .sum()
}

/// First destructive command pattern found in command text.
pub fn find_destructive_command(text: &str) -> Option<&'static str> {
    DESTRUCTIVE_COMMANDS
        .iter()
        .find(|(_, regex)| regex.is_match(text))
        .map(|(name, _)| *name)
}

/// First real proof tactic found in the text.
pub fn find_proof_tactic(text: &str) -> Option<&str> {
    PROOF_TACTICS.find(text).map(|m| m.as_str())
}

/// Number of placeholder proof markers in the text.
pub fn count_placeholders(text: &str) -> usize {
    PLACEHOLDER.find_iter(text).count()
}
