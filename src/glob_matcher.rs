//! Glob Matcher (C1): compiles include/exclude expressions into a callable
//! predicate, and extracts basename/path terms for pushing exclude work
//! into the walker's external command.
//!
//! Backed by `globset`, the same crate the teacher already depends on for
//! ripgrep-compatible glob syntax.

use crate::query::{GlobExpr, GlobRule};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Outcome of testing a candidate against a compiled expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The fast synchronous path settled the question.
    Decided(bool),
    /// A sibling predicate matched the pattern; its truth depends on
    /// whether `sibling_pattern` exists in the candidate's directory. The
    /// caller resolves this with a batched per-directory `readdir` (the
    /// "slow path" of spec §9).
    NeedsSibling { sibling_pattern: String },
}

struct CompiledSibling {
    set: GlobSet,
    pattern: String,
    sibling_pattern: String,
}

/// A compiled include or exclude expression, split into absolute-path and
/// relative-path halves (spec §3 invariant) so candidates are tested
/// without joining paths on the hot path.
pub struct GlobMatcher {
    relative_always: GlobSet,
    relative_negated: GlobSet,
    absolute_always: GlobSet,
    absolute_negated: GlobSet,
    relative_siblings: Vec<CompiledSibling>,
    absolute_siblings: Vec<CompiledSibling>,
    basename_terms: Vec<String>,
    path_terms: Vec<String>,
}

fn is_absolute_pattern(pattern: &str) -> bool {
    pattern.starts_with('/') || pattern.starts_with('\\') || pattern.get(1..2) == Some(":")
}

impl GlobMatcher {
    /// Compile a [`GlobExpr`] into a matcher. `rule == Always(false)` is
    /// treated as a negated entry: it can cancel an `Always(true)` match
    /// from a broader pattern compiled into the same set.
    pub fn compile(expr: &GlobExpr) -> Result<Self, crate::error::SearchError> {
        let mut rel_always = GlobSetBuilder::new();
        let mut rel_negated = GlobSetBuilder::new();
        let mut abs_always = GlobSetBuilder::new();
        let mut abs_negated = GlobSetBuilder::new();
        let mut relative_siblings = Vec::new();
        let mut absolute_siblings = Vec::new();
        let mut basename_terms = Vec::new();
        let mut path_terms = Vec::new();

        for (pattern, rule) in &expr.entries {
            let absolute = is_absolute_pattern(pattern);
            let glob = Glob::new(pattern).map_err(|e| {
                crate::error::SearchError::user_fatal(format!("bad glob '{pattern}': {e}"))
            })?;

            match rule {
                GlobRule::Always(true) | GlobRule::Always(false) => {
                    // Only unconditional entries may be pushed into an
                    // external command's argv (spec §4.1/§4.3) — sibling
                    // clauses need full directory context and are kept out
                    // of these lists entirely, see the `WhenSiblingExists`
                    // arm below.
                    if pattern.contains('/') || pattern.contains('\\') {
                        path_terms.push(pattern.clone());
                    } else {
                        basename_terms.push(pattern.clone());
                    }
                    if matches!(rule, GlobRule::Always(true)) {
                        if absolute {
                            abs_always.add(glob);
                        } else {
                            rel_always.add(glob);
                        }
                    } else if absolute {
                        abs_negated.add(glob);
                    } else {
                        rel_negated.add(glob);
                    }
                }
                GlobRule::WhenSiblingExists { pattern: sib } => {
                    let mut set = GlobSetBuilder::new();
                    set.add(glob);
                    let set = set.build().map_err(|e| {
                        crate::error::SearchError::user_fatal(format!(
                            "bad glob '{pattern}': {e}"
                        ))
                    })?;
                    let compiled =
                        CompiledSibling { set, pattern: pattern.clone(), sibling_pattern: sib.clone() };
                    if absolute {
                        absolute_siblings.push(compiled);
                    } else {
                        relative_siblings.push(compiled);
                    }
                }
            }
        }

        Ok(Self {
            relative_always: rel_always.build().map_err(globset_err)?,
            relative_negated: rel_negated.build().map_err(globset_err)?,
            absolute_always: abs_always.build().map_err(globset_err)?,
            absolute_negated: abs_negated.build().map_err(globset_err)?,
            relative_siblings,
            absolute_siblings,
            basename_terms,
            path_terms,
        })
    }

    /// Test a candidate's fast (synchronous) path. Returns `Decided` unless
    /// a sibling predicate matched, in which case the caller must resolve
    /// the slow path before trusting the answer.
    pub fn test(&self, relative_path: &Path, absolute_path: &Path) -> MatchOutcome {
        let rel_hit = self.relative_always.is_match(relative_path)
            && !self.relative_negated.is_match(relative_path);
        let abs_hit = self.absolute_always.is_match(absolute_path)
            && !self.absolute_negated.is_match(absolute_path);

        for sib in self.relative_siblings.iter().chain(self.absolute_siblings.iter()) {
            if sib.set.is_match(relative_path) || sib.set.is_match(absolute_path) {
                return MatchOutcome::NeedsSibling {
                    sibling_pattern: substitute_basename(&sib.sibling_pattern, relative_path),
                };
            }
        }

        MatchOutcome::Decided(rel_hit || abs_hit)
    }

    /// Bare filename patterns (no path separator) from `Always` entries
    /// only — safe to push into an external command's argv. Excludes
    /// `WhenSiblingExists` patterns, see [`Self::sibling_clause_patterns`].
    pub fn basename_terms(&self) -> &[String] {
        &self.basename_terms
    }

    /// Patterns containing a path separator, `Always` entries only.
    pub fn path_terms(&self) -> &[String] {
        &self.path_terms
    }

    /// The original glob patterns of every sibling-dependent clause. These
    /// can never be pushed into an external command's argv (they need full
    /// directory context); callers that need to know a clause exists
    /// without resolving it can inspect this, though this crate's backends
    /// use [`Self::has_sibling_clauses`] and [`Self::test`] instead.
    pub fn sibling_clause_patterns(&self) -> Vec<&str> {
        self.relative_siblings
            .iter()
            .chain(self.absolute_siblings.iter())
            .map(|s| s.pattern.as_str())
            .collect()
    }

    /// Whether any sibling-dependent exclude remains, i.e. whether the
    /// walker's optimization (spec §4.3: "if no sibling clauses remain,
    /// emit streamed lines directly") applies.
    pub fn has_sibling_clauses(&self) -> bool {
        !self.relative_siblings.is_empty() || !self.absolute_siblings.is_empty()
    }
}

fn globset_err(e: globset::Error) -> crate::error::SearchError {
    crate::error::SearchError::user_fatal(format!("glob compilation failed: {e}"))
}

/// Substitute `$(basename)` in a sibling pattern with the candidate's
/// filename stem.
fn substitute_basename(pattern: &str, relative_path: &Path) -> String {
    let stem = relative_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    pattern.replace("$(basename)", stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::GlobExpr;
    use std::path::PathBuf;

    #[test]
    fn basename_and_path_terms_split_by_separator() {
        let expr = GlobExpr::new()
            .with("*.png", GlobRule::Always(true))
            .with("src/**/*.rs", GlobRule::Always(false));
        let matcher = GlobMatcher::compile(&expr).unwrap();
        assert_eq!(matcher.basename_terms(), &["*.png".to_string()]);
        assert_eq!(matcher.path_terms(), &["src/**/*.rs".to_string()]);
    }

    #[test]
    fn sibling_rule_excluded_from_pushable_terms() {
        let expr = GlobExpr::new()
            .with("*.js", GlobRule::WhenSiblingExists { pattern: "$(basename).ts".into() })
            .with("*.log", GlobRule::Always(true));
        let matcher = GlobMatcher::compile(&expr).unwrap();
        assert_eq!(matcher.basename_terms(), &["*.log".to_string()]);
        assert!(matcher.path_terms().is_empty());
        assert_eq!(matcher.sibling_clause_patterns(), vec!["*.js"]);
    }

    #[test]
    fn sibling_rule_requires_resolution() {
        let expr = GlobExpr::new()
            .with("*.js", GlobRule::WhenSiblingExists { pattern: "$(basename).ts".into() });
        let matcher = GlobMatcher::compile(&expr).unwrap();
        let outcome = matcher.test(&PathBuf::from("foo.js"), &PathBuf::from("/root/foo.js"));
        assert!(matches!(outcome, MatchOutcome::NeedsSibling { .. }));
        assert!(matcher.has_sibling_clauses());
    }

    #[test]
    fn plain_exclude_decides_synchronously() {
        let expr = GlobExpr::new().with("*.png", GlobRule::Always(true));
        let matcher = GlobMatcher::compile(&expr).unwrap();
        let outcome = matcher.test(&PathBuf::from("a.png"), &PathBuf::from("/root/a.png"));
        assert_eq!(outcome, MatchOutcome::Decided(true));
        let outcome = matcher.test(&PathBuf::from("a.rs"), &PathBuf::from("/root/a.rs"));
        assert_eq!(outcome, MatchOutcome::Decided(false));
    }
}
