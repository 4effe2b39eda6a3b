//! File Walker (C3): traverses a root folder via one of three backends,
//! producing candidate files.
//!
//! Backend 3 (native recursive readdir) is built on the `ignore` crate's
//! `WalkBuilder` — the teacher's own dependency for gitignore-aware
//! parallel traversal — rather than hand-rolled `std::fs::read_dir`
//! recursion. This keeps the exclude/include predicate (C1) as a
//! `filter_entry`-style check while reusing cycle-safe traversal the
//! teacher already relies on.

mod grep_files;
mod native;
mod posix_find;

use crate::error::SearchError;
use crate::glob_matcher::GlobMatcher;
use crate::query::FolderQuery;
use crate::result::RawFileMatch;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc::UnboundedSender;

/// Which traversal strategy the walker picked for a given walk (spec
/// §4.3). Exposed so stats/tests can observe the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    GrepFiles,
    PosixFind,
    Native,
}

/// Inputs that decide backend selection: host OS capability, whether a
/// per-file size limit is set (which only the native backend can honor,
/// since external tools don't report sizes reliably), and whether the
/// caller disabled grep-based listing.
pub struct BackendSelection {
    pub grep_available: bool,
    pub posix_find_available: bool,
    pub max_filesize: Option<u64>,
}

/// Probe whether `binary` actually resolves to an executable file, the way
/// a shell would look it up: directly if it contains a path separator,
/// otherwise by scanning `PATH` (spec §4.3's backend selection depends on
/// grep genuinely being available, not just configured).
pub fn probe_grep_available(binary: &Path) -> bool {
    if binary.components().count() > 1 {
        return is_executable_file(binary);
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| is_executable_file(&dir.join(binary))))
        .unwrap_or(false)
}

fn is_executable_file(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

pub fn choose_backend(sel: &BackendSelection) -> Backend {
    if sel.max_filesize.is_some() {
        return Backend::Native;
    }
    if sel.grep_available {
        return Backend::GrepFiles;
    }
    if sel.posix_find_available {
        return Backend::PosixFind;
    }
    Backend::Native
}

/// Shared state the three backends reserve result slots against, so a
/// `max_results`/`exists_only` cap is honored even though roots run
/// concurrently.
pub struct WalkBudget {
    pub max_results: Option<usize>,
    pub exists_only: bool,
    pub max_filesize: Option<u64>,
    pub emitted: AtomicUsize,
    pub limit_hit: AtomicBool,
    pub cancelled: Arc<AtomicBool>,
}

impl WalkBudget {
    pub fn new(
        max_results: Option<usize>,
        exists_only: bool,
        max_filesize: Option<u64>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            max_results,
            exists_only,
            max_filesize,
            emitted: AtomicUsize::new(0),
            limit_hit: AtomicBool::new(false),
            cancelled,
        }
    }

    /// Reserve one result slot. Returns `false` (and sets `limit_hit`) if
    /// the cap is already exhausted.
    pub fn reserve(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        let cap = if self.exists_only { 1 } else { self.max_results.unwrap_or(usize::MAX) };
        let prev = self.emitted.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            if n >= cap { None } else { Some(n + 1) }
        });
        match prev {
            Ok(_) => true,
            Err(_) => {
                self.limit_hit.store(true, Ordering::Release);
                false
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// A synchronous file-name test; boxed so the three backends can share one
/// signature regardless of whether it closes over a fuzzy matcher (file
/// search) or is absent (content search, which filters by grep match
/// instead).
pub type FilePatternTest = dyn Fn(&str) -> bool + Send + Sync;

/// Walk a single folder root, sending matching candidates down `tx`.
/// Honors the step order from spec §4.3: exclude gate, include +
/// file-pattern gate, symlink cycle-breaking (native backend only —
/// external tools already resolve this themselves), then budget
/// reservation.
pub async fn walk_root(
    folder: FolderQuery,
    include: Arc<GlobMatcher>,
    exclude: Arc<GlobMatcher>,
    file_pattern_test: Option<Arc<FilePatternTest>>,
    budget: Arc<WalkBudget>,
    backend: Backend,
    grep_binary: Arc<Path>,
    follow_symlinks: bool,
    tx: UnboundedSender<RawFileMatch>,
) -> Result<(), SearchError> {
    match backend {
        Backend::GrepFiles => {
            grep_files::walk(
                folder,
                include,
                exclude,
                file_pattern_test,
                budget,
                grep_binary,
                follow_symlinks,
                tx,
            )
            .await
        }
        Backend::PosixFind => {
            posix_find::walk(folder, include, exclude, file_pattern_test, budget, follow_symlinks, tx)
                .await
        }
        Backend::Native => {
            let folder = Arc::new(folder);
            let budget2 = Arc::clone(&budget);
            tokio::task::spawn_blocking(move || {
                native::walk(
                    &folder,
                    &include,
                    &exclude,
                    file_pattern_test.as_deref(),
                    &budget2,
                    follow_symlinks,
                    &tx,
                )
            })
            .await
            .map_err(|e| SearchError::internal(format!("walker task panicked: {e}")))?
        }
    }
}

/// Filter the query's extra (loose) files directly against global exclude,
/// include and file-pattern, bypassing any directory walk (spec §4.3 step
/// 1).
pub fn filter_extra_files(
    extra_files: &[std::path::PathBuf],
    include: &GlobMatcher,
    exclude: &GlobMatcher,
    file_pattern_test: Option<&FilePatternTest>,
) -> Vec<RawFileMatch> {
    let mut out = Vec::new();
    for path in extra_files {
        let basename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let rel_path = Path::new(&basename);

        if matches!(
            exclude.test(rel_path, path),
            crate::glob_matcher::MatchOutcome::Decided(true)
        ) {
            continue;
        }
        let has_include_terms =
            !include.basename_terms().is_empty() || !include.path_terms().is_empty();
        if has_include_terms
            && !matches!(include.test(rel_path, path), crate::glob_matcher::MatchOutcome::Decided(true))
        {
            continue;
        }
        if let Some(test) = file_pattern_test {
            if !test(&basename) {
                continue;
            }
        }

        let parent = path.parent().unwrap_or(Path::new("")).to_path_buf();
        out.push(RawFileMatch {
            base: parent,
            relative_path: basename.clone(),
            basename,
            size: None,
            modified: None,
            accessed: None,
            created: None,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grep_probe_rejects_nonexistent_binary() {
        assert!(!probe_grep_available(Path::new("definitely-not-a-real-binary-xyz")));
    }

    #[test]
    fn grep_probe_rejects_nonexistent_absolute_path() {
        assert!(!probe_grep_available(Path::new("/no/such/path/rg")));
    }

    #[test]
    fn unavailable_grep_falls_back_to_posix_find_then_native() {
        let backend = choose_backend(&BackendSelection {
            grep_available: false,
            posix_find_available: true,
            max_filesize: None,
        });
        assert_eq!(backend, Backend::PosixFind);

        let backend = choose_backend(&BackendSelection {
            grep_available: false,
            posix_find_available: false,
            max_filesize: None,
        });
        assert_eq!(backend, Backend::Native);
    }
}
