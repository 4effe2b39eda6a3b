//! Backend 1 (preferred): spawn the grep binary with `--files` (no
//! pattern), reusing C1's exclude globs as `-g` arguments, and read
//! newline-separated paths from stdout (spec §4.3).

use super::{FilePatternTest, WalkBudget};
use crate::directory_tree::DirectoryTree;
use crate::error::SearchError;
use crate::glob_matcher::{GlobMatcher, MatchOutcome};
use crate::query::FolderQuery;
use crate::result::RawFileMatch;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

pub async fn walk(
    folder: FolderQuery,
    include: Arc<GlobMatcher>,
    exclude: Arc<GlobMatcher>,
    file_pattern_test: Option<Arc<FilePatternTest>>,
    budget: Arc<WalkBudget>,
    grep_binary: Arc<Path>,
    follow_symlinks: bool,
    tx: UnboundedSender<RawFileMatch>,
) -> Result<(), SearchError> {
    let mut cmd = Command::new(&*grep_binary);
    cmd.arg("--files").arg("--hidden").arg("--no-config").arg("--no-ignore-global");

    if folder.disregard_ignore_files {
        cmd.arg("--no-ignore");
    }
    if follow_symlinks {
        cmd.arg("--follow");
    }

    // Plain excludes are pushed into the command; sibling-dependent ones
    // cannot be (they need full directory context) and are left for the
    // caller to post-apply via the Directory Tree (C2), which is why this
    // backend does not itself check `exclude.has_sibling_clauses()`.
    for term in exclude.basename_terms().iter().chain(exclude.path_terms()) {
        cmd.arg("-g").arg(format!("!{term}"));
    }
    for term in include.basename_terms().iter().chain(include.path_terms()) {
        cmd.arg("-g").arg(term);
    }

    cmd.arg(&folder.root);
    cmd.stdout(Stdio::piped()).stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| {
        SearchError::child_crash(format!("failed to spawn {}: {e}", grep_binary.display()))
    })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        SearchError::internal("grep --files child had no stdout handle")
    })?;
    let mut lines = BufReader::new(stdout).lines();

    let has_sibling_clauses = exclude.has_sibling_clauses();

    if has_sibling_clauses {
        // Sibling-dependent excludes cannot be decided line-by-line as
        // they stream in — the decision needs every sibling's basename,
        // which may not have been seen yet. Buffer the whole listing into
        // the Directory Tree (C2) and resolve the entire expression with
        // full directory context once the child has finished (spec §4.2,
        // §4.3).
        let mut tree = DirectoryTree::new();
        while let Some(line) = lines.next_line().await.map_err(SearchError::from)? {
            if budget.is_cancelled() {
                let _ = child.kill().await;
                return Err(SearchError::Cancelled);
            }
            let absolute = std::path::PathBuf::from(&line);
            if let Ok(relative) = absolute.strip_prefix(&folder.root) {
                tree.insert(relative);
            }
        }
        let status = child.wait().await.map_err(SearchError::from)?;
        if !status.success() {
            log::debug!("grep --files exited with {status}");
        }

        let has_include_terms =
            !include.basename_terms().is_empty() || !include.path_terms().is_empty();
        for raw in tree.match_tree(&exclude, &folder.root, None) {
            if budget.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            let relative = std::path::Path::new(&raw.relative_path);
            let absolute = raw.absolute_path();
            if has_include_terms
                && !matches!(include.test(relative, &absolute), MatchOutcome::Decided(true))
            {
                continue;
            }
            if let Some(test) = &file_pattern_test {
                if !test(&raw.basename) {
                    continue;
                }
            }
            if !budget.reserve() {
                return Ok(());
            }
            let _ = tx.send(raw);
        }
        return Ok(());
    }

    while let Some(line) = lines.next_line().await.map_err(SearchError::from)? {
        if budget.is_cancelled() {
            let _ = child.kill().await;
            return Err(SearchError::Cancelled);
        }

        let absolute = std::path::PathBuf::from(&line);
        let Ok(relative) = absolute.strip_prefix(&folder.root) else { continue };

        let basename = relative
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if let Some(test) = &file_pattern_test {
            if !test(&basename) {
                continue;
            }
        }

        if !budget.reserve() {
            let _ = child.kill().await;
            return Ok(());
        }

        let _ = tx.send(RawFileMatch {
            base: folder.root.clone(),
            relative_path: relative.to_string_lossy().into_owned(),
            basename,
            size: None,
            modified: None,
            accessed: None,
            created: None,
        });
    }

    let status = child.wait().await.map_err(SearchError::from)?;
    if !status.success() {
        // `--files` with no matches still exits 0; a nonzero exit here is
        // a real failure (bad root, permission denied at the top level).
        log::debug!("grep --files exited with {status}");
    }

    Ok(())
}
