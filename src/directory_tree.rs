//! Directory Tree (C2): an in-memory relative-path tree populated from an
//! external command's streamed output, matched against the exclude
//! expression once the sibling-dependent clauses require full directory
//! context.

use crate::glob_matcher::{GlobMatcher, MatchOutcome};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub name: String,
    pub relative_path: PathBuf,
}

/// `rootEntries[]` plus `pathToEntries[relativeDirPath] -> entry[]` (spec
/// §4.2).
#[derive(Debug, Default)]
pub struct DirectoryTree {
    root_entries: Vec<TreeEntry>,
    path_to_entries: HashMap<PathBuf, Vec<TreeEntry>>,
}

impl DirectoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one relative file path streamed from the external command.
    pub fn insert(&mut self, relative_path: &Path) {
        let name = relative_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let entry = TreeEntry { name, relative_path: relative_path.to_path_buf() };

        match relative_path.parent() {
            None | Some(p) if p == Some(Path::new("")) => {
                self.root_entries.push(entry);
            }
            Some(parent) => {
                self.path_to_entries.entry(parent.to_path_buf()).or_default().push(entry);
            }
        }
    }

    fn entries_for_dir(&self, dir: &Path) -> &[TreeEntry] {
        if dir == Path::new("") {
            &self.root_entries
        } else {
            self.path_to_entries.get(dir).map(Vec::as_slice).unwrap_or(&[])
        }
    }

    /// DFS from the root, applying `exclude` once per directory and
    /// lazily computing `has_sibling` from the already-loaded entry list
    /// (no extra filesystem access, unlike the walker's own slow path).
    ///
    /// `literal_file_pattern` preserves the "I know exactly what I want"
    /// override: a file whose relative path equals it literally is
    /// reported regardless of what exclude would otherwise decide.
    pub fn match_tree(
        &self,
        exclude: &GlobMatcher,
        base: &Path,
        literal_file_pattern: Option<&str>,
    ) -> Vec<crate::result::RawFileMatch> {
        let mut out = Vec::new();
        self.visit_dir(Path::new(""), exclude, base, literal_file_pattern, &mut out);
        out
    }

    fn visit_dir(
        &self,
        dir: &Path,
        exclude: &GlobMatcher,
        base: &Path,
        literal_file_pattern: Option<&str>,
        out: &mut Vec<crate::result::RawFileMatch>,
    ) {
        let entries = self.entries_for_dir(dir);
        for entry in entries {
            let absolute = base.join(&entry.relative_path);
            let literal_override = literal_file_pattern
                .is_some_and(|pat| entry.relative_path.to_string_lossy() == pat);

            if !literal_override {
                match exclude.test(&entry.relative_path, &absolute) {
                    MatchOutcome::Decided(true) => continue,
                    MatchOutcome::NeedsSibling { sibling_pattern } => {
                        if self.has_sibling(dir, &sibling_pattern) {
                            continue;
                        }
                    }
                    MatchOutcome::Decided(false) => {}
                }
            }

            out.push(crate::result::RawFileMatch {
                base: base.to_path_buf(),
                relative_path: entry.relative_path.to_string_lossy().into_owned(),
                basename: entry.name.clone(),
                size: None,
                modified: None,
                accessed: None,
                created: None,
            });

            self.visit_dir(&entry.relative_path, exclude, base, literal_file_pattern, out);
        }
    }

    /// `has_sibling` computed from the entries already loaded for `dir` —
    /// the "single readdir caches the basenames" optimization of spec §9,
    /// here free since the whole tree was already streamed in.
    fn has_sibling(&self, dir: &Path, sibling_pattern: &str) -> bool {
        self.entries_for_dir(dir).iter().any(|e| e.name == sibling_pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{GlobExpr, GlobRule};

    #[test]
    fn literal_pattern_survives_sibling_exclusion() {
        let mut tree = DirectoryTree::new();
        tree.insert(Path::new("foo.js"));
        tree.insert(Path::new("foo.ts"));

        let expr = GlobExpr::new()
            .with("*.js", GlobRule::WhenSiblingExists { pattern: "$(basename).ts".into() });
        let exclude = GlobMatcher::compile(&expr).unwrap();

        let matches = tree.match_tree(&exclude, Path::new("/root"), None);
        let names: Vec<_> = matches.iter().map(|m| m.basename.as_str()).collect();
        assert!(!names.contains(&"foo.js"));

        let matches = tree.match_tree(&exclude, Path::new("/root"), Some("foo.js"));
        let names: Vec<_> = matches.iter().map(|m| m.basename.as_str()).collect();
        assert!(names.contains(&"foo.js"));
    }
}
