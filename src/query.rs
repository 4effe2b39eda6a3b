//! Query data model (spec §3: Query, Glob expression, Folder query).

use std::collections::HashMap;
use std::path::PathBuf;

/// The value side of a glob expression entry: either an unconditional
/// exclude/include, or a sibling predicate that only applies when another
/// file exists alongside the candidate.
#[derive(Debug, Clone)]
pub enum GlobRule {
    /// `true` = always exclude/include this pattern, `false` = never (an
    /// explicit negative entry, used to punch a hole in a broader glob).
    Always(bool),
    /// `{when: "$(basename).ext"}` — only applies when a file matching the
    /// substituted pattern exists in the same directory as the candidate.
    WhenSiblingExists { pattern: String },
}

/// A mapping from glob string to rule, as accepted at the API boundary
/// before compilation by the glob matcher (C1).
#[derive(Debug, Clone, Default)]
pub struct GlobExpr {
    pub entries: HashMap<String, GlobRule>,
}

impl GlobExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pattern: impl Into<String>, rule: GlobRule) -> Self {
        self.entries.insert(pattern.into(), rule);
        self
    }
}

/// A single root folder plus the excludes/includes/encoding that apply to
/// it (glossary: "folder query").
#[derive(Debug, Clone)]
pub struct FolderQuery {
    pub root: PathBuf,
    pub exclude: GlobExpr,
    pub include: GlobExpr,
    /// Text encoding passed through to the grep binary's `--encoding` flag.
    /// Not validated by this crate; an unsupported name surfaces as a
    /// user-fatal error via the child process's stderr.
    pub encoding: Option<String>,
    /// When true, the grep binary's own ignore-file handling (`.gitignore`
    /// etc.) is disabled for this root.
    pub disregard_ignore_files: bool,
}

impl FolderQuery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: GlobExpr::new(),
            include: GlobExpr::new(),
            encoding: None,
            disregard_ignore_files: false,
        }
    }
}

/// Content-search specific parameters (spec §3: "for text search a content
/// pattern").
#[derive(Debug, Clone)]
pub struct ContentPattern {
    pub pattern: String,
    pub is_regex: bool,
    pub is_case_sensitive: bool,
    pub is_word_match: bool,
    /// Custom word-separator characters for `is_word_match`, beyond the
    /// default `\b` boundary.
    pub word_separators: Option<String>,
}

/// How much context to capture around a text match for the preview string.
#[derive(Debug, Clone, Copy)]
pub struct PreviewOptions {
    pub max_chars_before: usize,
    pub max_chars_after: usize,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self { max_chars_before: 100, max_chars_after: 100 }
    }
}

/// A single search request, covering both file search and text search (the
/// two query kinds named in spec §1). Which fields are consulted depends on
/// whether `content` is present.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub folder_queries: Vec<FolderQuery>,
    /// Loose files searched directly, outside any folder walk.
    pub extra_files: Vec<PathBuf>,
    /// Fuzzy file-name pattern: the primary criterion for file search, and
    /// an auxiliary filter applied to text search's candidate files.
    pub file_pattern: Option<String>,
    pub global_exclude: GlobExpr,
    pub global_include: GlobExpr,
    pub max_results: Option<usize>,
    /// Return as soon as one match is found, reporting `limit_hit = true`.
    pub exists_only: bool,
    pub max_filesize: Option<u64>,
    pub sort_by_score: bool,
    pub cache_key: Option<String>,
    pub follow_symlinks: bool,
    pub content: Option<ContentPattern>,
    pub preview: PreviewOptions,
}

impl SearchQuery {
    pub fn is_content_search(&self) -> bool {
        self.content.is_some()
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            folder_queries: Vec::new(),
            extra_files: Vec::new(),
            file_pattern: None,
            global_exclude: GlobExpr::new(),
            global_include: GlobExpr::new(),
            max_results: None,
            exists_only: false,
            max_filesize: None,
            sort_by_score: false,
            cache_key: None,
            follow_symlinks: true,
            content: None,
            preview: PreviewOptions::default(),
        }
    }
}
