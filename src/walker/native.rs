//! Backend 3: native recursive readdir, via the `ignore` crate's
//! `WalkBuilder`. Used when external tools are unavailable, or when a
//! per-file size limit forces per-entry `stat` calls (spec §4.3).
//!
//! Runs synchronously; the caller (`walker::walk_root`) dispatches it via
//! `spawn_blocking`.

use super::WalkBudget;
use crate::error::SearchError;
use crate::glob_matcher::{GlobMatcher, MatchOutcome};
use crate::query::FolderQuery;
use crate::result::RawFileMatch;
use ignore::WalkBuilder;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

/// A per-directory `readdir` cache for resolving `MatchOutcome::NeedsSibling`
/// against the real filesystem: the native backend walks entries one at a
/// time rather than consuming a fully-buffered listing (unlike the grep/find
/// backends' Directory Tree, C2), so sibling resolution here reads each
/// directory at most once regardless of how many of its entries carry a
/// sibling clause (spec §9's "a single readdir caches the basenames").
#[derive(Default)]
struct SiblingCache {
    dirs: HashMap<PathBuf, HashSet<String>>,
}

impl SiblingCache {
    fn has_sibling(&mut self, dir: &Path, sibling_name: &str) -> bool {
        let names = self.dirs.entry(dir.to_path_buf()).or_insert_with(|| {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default()
        });
        names.contains(sibling_name)
    }
}

pub fn walk(
    folder: &FolderQuery,
    include: &GlobMatcher,
    exclude: &GlobMatcher,
    file_pattern_test: Option<&(dyn Fn(&str) -> bool + Send + Sync)>,
    budget: &WalkBudget,
    follow_symlinks: bool,
    tx: &UnboundedSender<RawFileMatch>,
) -> Result<(), SearchError> {
    let mut visited: HashSet<std::path::PathBuf> = HashSet::new();
    let mut sibling_cache = SiblingCache::default();

    let mut builder = WalkBuilder::new(&folder.root);
    builder
        .hidden(false)
        .git_ignore(!folder.disregard_ignore_files)
        .git_global(!folder.disregard_ignore_files)
        .git_exclude(!folder.disregard_ignore_files)
        .parents(!folder.disregard_ignore_files)
        .follow_links(false); // symlinks handled manually below, per spec §4.3 step 3

    let has_include_terms =
        !include.basename_terms().is_empty() || !include.path_terms().is_empty();

    for entry in builder.build() {
        if budget.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                log::debug!("walker entry error: {err}");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else { continue };
        let absolute = entry.path().to_path_buf();

        if file_type.is_symlink() {
            if !follow_symlinks {
                continue;
            }
            match std::fs::canonicalize(&absolute) {
                Ok(real) => {
                    if !visited.insert(real) {
                        continue; // cycle, already visited this real path
                    }
                }
                Err(err) => {
                    log::debug!("symlink resolution failed for {}: {err}", absolute.display());
                    continue;
                }
            }
        }

        if !file_type.is_file() {
            continue;
        }

        let Ok(relative) = absolute.strip_prefix(&folder.root) else { continue };

        match exclude.test(relative, &absolute) {
            MatchOutcome::Decided(true) => continue,
            MatchOutcome::NeedsSibling { sibling_pattern } => {
                let dir = absolute.parent().unwrap_or(Path::new(""));
                if sibling_cache.has_sibling(dir, &sibling_pattern) {
                    continue;
                }
            }
            MatchOutcome::Decided(false) => {}
        }
        if has_include_terms
            && !matches!(include.test(relative, &absolute), MatchOutcome::Decided(true))
        {
            continue;
        }

        if let Some(limit) = budget.max_filesize {
            match std::fs::metadata(&absolute) {
                Ok(meta) if meta.len() > limit => continue,
                Ok(_) => {}
                Err(err) => {
                    log::debug!("stat failed for {}: {err}", absolute.display());
                    continue;
                }
            }
        }

        let basename = entry.file_name().to_str().unwrap_or_default().to_string();

        if let Some(test) = file_pattern_test {
            if !test(&basename) {
                continue;
            }
        }

        if !budget.reserve() {
            return Ok(());
        }

        let size = std::fs::metadata(&absolute).ok().map(|m| m.len());
        let _ = tx.send(RawFileMatch {
            base: folder.root.clone(),
            relative_path: relative.to_string_lossy().into_owned(),
            basename,
            size,
            modified: None,
            accessed: None,
            created: None,
        });
    }

    Ok(())
}
