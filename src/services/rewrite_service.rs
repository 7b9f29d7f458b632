// Ordered, directional text substitution with a safety gate on patterns.
//
// The regex crate runs in linear time, so the classic catastrophic
// backtracking blowup cannot happen here. The safety check still exists:
// rules are frequently authored for backtracking engines and shared across
// deployments, oversized patterns carry real compile/scan cost, and the
// probe bounds whatever the static checks miss. It is a heuristic defense,
// not a proof of safety.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::errors::{AppError, Result};
use crate::models::{RewriteDirection, RewriteRule};
use crate::storage::RewriteRuleStore;

/// Patterns longer than this are rejected outright.
pub const MAX_PATTERN_LENGTH: usize = 1000;
/// Wall-clock bound on the admission-time probe execution.
pub const PATTERN_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

// Nested-quantifier shapes such as `(x+)+` and `(x*)*`.
static NESTED_QUANTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^()]*[+*]\)\s*[+*]").expect("static scanner pattern"));

// Worst-case probe input: a long homogeneous run with a non-matching tail.
static PROBE_INPUT: Lazy<String> = Lazy::new(|| {
    let mut probe = "a".repeat(4096);
    probe.push('!');
    probe
});

#[derive(Clone)]
pub struct RewriteService {
    store: Arc<dyn RewriteRuleStore>,
}

impl RewriteService {
    #[must_use]
    pub fn new(store: Arc<dyn RewriteRuleStore>) -> Self {
        Self { store }
    }

    /// Full admission-time validation: static checks, compilation, and one
    /// probed execution under a wall-clock timeout. Required before a rule
    /// is accepted for storage.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRegex` describing the first failed check.
    pub async fn validate_pattern(pattern: &str) -> Result<()> {
        static_pattern_checks(pattern)?;
        let compiled = Regex::new(pattern)
            .map_err(|e| AppError::InvalidRegex(format!("pattern does not compile: {e}")))?;

        // The probe runs on a blocking thread so an expensive evaluation
        // cannot stall the runtime; on timeout the orphaned task finishes
        // on its own and its result is discarded.
        let probe = tokio::task::spawn_blocking(move || compiled.is_match(&PROBE_INPUT));
        match tokio::time::timeout(PATTERN_PROBE_TIMEOUT, probe).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(join_error)) => Err(AppError::InvalidRegex(format!(
                "pattern probe panicked: {join_error}"
            ))),
            Err(_) => Err(AppError::InvalidRegex(
                "pattern probe exceeded the time limit".to_string(),
            )),
        }
    }

    /// Applies all enabled rules for `direction` visible to `scope`, in
    /// ascending `(sort_order, id)` order, feeding each rule's output into
    /// the next. A bad rule is skipped, never fatal; a store failure
    /// degrades to returning the input unchanged.
    #[tracing::instrument(skip_all, fields(%direction, ?scope))]
    pub async fn apply(
        &self,
        direction: RewriteDirection,
        scope: Option<i64>,
        text: &str,
    ) -> String {
        let rules = match self.store.list_rules(scope).await {
            Ok(rules) => rules,
            Err(error) => {
                warn!(%error, "failed to load rewrite rules, leaving text unchanged");
                return text.to_string();
            }
        };

        let mut applicable: Vec<RewriteRule> = rules
            .into_iter()
            .filter(|rule| rule.is_enabled && rule.direction == direction)
            .collect();
        applicable.sort_by_key(|rule| (rule.sort_order, rule.id));

        let mut current = text.to_string();
        for rule in &applicable {
            // Re-check the static safety gate at apply time; the stored
            // rule may predate a tightening of the checks.
            if let Err(error) = static_pattern_checks(&rule.pattern) {
                warn!(rule_id = rule.id, %error, "skipping unsafe rewrite rule");
                continue;
            }
            match Regex::new(&rule.pattern) {
                Ok(compiled) => {
                    current = compiled
                        .replace_all(&current, rule.replacement.as_str())
                        .into_owned();
                }
                Err(error) => {
                    warn!(rule_id = rule.id, %error, "skipping uncompilable rewrite rule");
                }
            }
        }
        debug!(
            rules_applied = applicable.len(),
            original_length = text.len(),
            rewritten_length = current.len(),
            "rewrite pipeline applied"
        );
        current
    }
}

/// Cheap structural checks, run at admission and again at apply time.
fn static_pattern_checks(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(AppError::InvalidRegex("pattern is empty".to_string()));
    }
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(AppError::InvalidRegex(format!(
            "pattern exceeds {MAX_PATTERN_LENGTH} characters"
        )));
    }
    if NESTED_QUANTIFIER.is_match(pattern) {
        return Err(AppError::InvalidRegex(
            "pattern contains a nested quantifier".to_string(),
        ));
    }
    if has_duplicate_alternation(pattern) {
        return Err(AppError::InvalidRegex(
            "pattern contains a duplicate alternation branch".to_string(),
        ));
    }
    Ok(())
}

// Detects `(a|a)`-style groups where two alternation branches are
// identical. The regex crate has no backreferences, so this is a small
// hand parser: walk each group at its own nesting depth and compare its
// top-level branches.
fn has_duplicate_alternation(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut index = 0;
    while index < chars.len() {
        match chars[index] {
            '\\' => index += 1,
            '(' => {
                if let Some(body) = group_body(&chars, index) {
                    let mut branches: Vec<String> = Vec::new();
                    let mut current = String::new();
                    let mut depth = 0usize;
                    let mut body_chars = body.chars().peekable();
                    while let Some(c) = body_chars.next() {
                        match c {
                            '\\' => {
                                current.push(c);
                                if let Some(next) = body_chars.next() {
                                    current.push(next);
                                }
                            }
                            '(' => {
                                depth += 1;
                                current.push(c);
                            }
                            ')' => {
                                depth = depth.saturating_sub(1);
                                current.push(c);
                            }
                            '|' if depth == 0 => {
                                branches.push(std::mem::take(&mut current));
                            }
                            _ => current.push(c),
                        }
                    }
                    branches.push(current);
                    if branches.len() > 1 {
                        let mut seen = std::collections::HashSet::new();
                        for branch in &branches {
                            if !seen.insert(branch) {
                                return true;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        index += 1;
    }
    false
}

// Returns the body of the group opening at `open`, or None if unbalanced.
fn group_body(chars: &[char], open: usize) -> Option<String> {
    let mut depth = 0usize;
    let mut index = open;
    while index < chars.len() {
        match chars[index] {
            '\\' => index += 1,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(chars[open + 1..index].iter().collect());
                }
            }
            _ => {}
        }
        index += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_checks_reject_empty() {
        assert!(static_pattern_checks("").is_err());
    }

    #[test]
    fn test_static_checks_reject_oversized() {
        let oversized = "a".repeat(MAX_PATTERN_LENGTH + 1);
        assert!(static_pattern_checks(&oversized).is_err());
    }

    #[test]
    fn test_static_checks_reject_nested_quantifiers() {
        assert!(static_pattern_checks("(x+)+").is_err());
        assert!(static_pattern_checks("(x*)*").is_err());
        assert!(static_pattern_checks("(ab+)*").is_err());
    }

    #[test]
    fn test_static_checks_reject_duplicate_alternation() {
        assert!(static_pattern_checks("(a|a)*").is_err());
        assert!(static_pattern_checks("(foo|bar|foo)").is_err());
    }

    #[test]
    fn test_static_checks_accept_ordinary_patterns() {
        assert!(static_pattern_checks("hello").is_ok());
        assert!(static_pattern_checks(r"\bdragons?\b").is_ok());
        assert!(static_pattern_checks("(foo|bar)").is_ok());
        assert!(static_pattern_checks("(a+)").is_ok());
    }

    #[test]
    fn test_duplicate_alternation_respects_nesting() {
        // The inner groups differ; no top-level branch repeats.
        assert!(!has_duplicate_alternation("((a|b)|(c|d))"));
        assert!(has_duplicate_alternation("((a|b)|(a|b))"));
    }

    #[tokio::test]
    async fn test_validate_pattern_accepts_safe_pattern() {
        assert!(RewriteService::validate_pattern(r"hello\s+world").await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_pattern_rejects_uncompilable() {
        let err = RewriteService::validate_pattern("(unclosed").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRegex(_)));
    }
}
