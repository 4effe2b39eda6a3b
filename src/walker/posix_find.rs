//! Backend 2: POSIX `find` on macOS/Linux when grep-based listing is
//! disabled. Builds a `-not ( -name … -path … ) -prune` expression from
//! C1's basename and path terms (spec §4.3).

use super::{FilePatternTest, WalkBudget};
use crate::directory_tree::DirectoryTree;
use crate::error::SearchError;
use crate::glob_matcher::{GlobMatcher, MatchOutcome};
use crate::query::FolderQuery;
use crate::result::RawFileMatch;
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
    follow_symlinks: bool,
    tx: UnboundedSender<RawFileMatch>,
) -> Result<(), SearchError> {
    let mut cmd = Command::new("find");
    if follow_symlinks {
        cmd.arg("-L");
    }
    cmd.arg(&folder.root);

    let prune_terms: Vec<String> = exclude
        .basename_terms()
        .iter()
        .map(|p| format!("-name '{p}'"))
        .chain(exclude.path_terms().iter().map(|p| format!("-path '*{p}'")))
        .collect();

    if !prune_terms.is_empty() {
        cmd.arg("-not").arg("(");
        for (i, term) in prune_terms.iter().enumerate() {
            if i > 0 {
                cmd.arg("-o");
            }
            for part in term.split(' ') {
                cmd.arg(part.trim_matches('\''));
            }
        }
        cmd.arg(")").arg("-prune").arg("-o");
    }
    cmd.arg("-type").arg("f").arg("-print");

    cmd.stdout(Stdio::piped()).stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| {
        SearchError::child_crash(format!("failed to spawn find: {e}"))
    })?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SearchError::internal("find child had no stdout handle"))?;
    let mut lines = BufReader::new(stdout).lines();

    let has_include_terms =
        !include.basename_terms().is_empty() || !include.path_terms().is_empty();
    let has_sibling_clauses = exclude.has_sibling_clauses();

    if has_sibling_clauses {
        // `find`'s own expression can only prune on plain names/paths, so
        // sibling-dependent excludes are not part of `prune_terms` above.
        // Buffer the listing and resolve them through the Directory Tree
        // (C2) once `find` has finished, same as the grep-files backend.
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
        let _ = child.wait().await;

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

        if matches!(exclude.test(relative, &absolute), MatchOutcome::Decided(true)) {
            continue;
        }
        if has_include_terms
            && !matches!(include.test(relative, &absolute), MatchOutcome::Decided(true))
        {
            continue;
        }

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

    let _ = child.wait().await;
    Ok(())
}
