//! Grep Driver (C5): builds argv, spawns the child grep process, forwards
//! its stdout to the parser, enforces limits, and classifies failures
//! (spec §4.5, §6, §7).
//!
//! Modeled on the corpus's own subprocess-streaming idiom for driving an
//! external search tool (`tokio::process::Command` + `AsyncBufReadExt`
//! over the child's stdout), the same shape used elsewhere in the pack for
//! streaming a ripgrep-family child's output line by line.

use super::parser::{GrepParser, ParserEvent};
use crate::error::SearchError;
use crate::query::{ContentPattern, FolderQuery};
use crate::result::FileTextMatch;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// First-line stderr prefixes that identify a user-fatal failure rather
/// than an unexpected crash (spec §4.5, §7).
const FATAL_STDERR_WHITELIST: &[&str] = &[
    "regex parse error",
    "error parsing flag",
    "unrecognized encoding",
    "error: unrecognized",
    "unsupported encoding",
    "glob parse error",
];

pub struct DriverOutcome {
    pub hit_limit: bool,
}

/// Build the content-pattern positional argument, applying the rewrites
/// spec §4.5 calls for: word-bounding, `$` → `\r?$` for regex patterns,
/// and forcing regex mode when the user's literal text is exactly `--`.
pub fn synthesize_pattern_arg(content: &ContentPattern) -> (bool, String) {
    let literal_dashdash = content.pattern == "--";
    let mut is_regex = content.is_regex || literal_dashdash;
    let mut pattern = content.pattern.clone();

    if literal_dashdash {
        pattern = regex::escape(&pattern);
    }

    if is_regex && pattern.ends_with('$') && !pattern.ends_with("\\$") {
        pattern.truncate(pattern.len() - 1);
        pattern.push_str("\\r?$");
    }

    if content.is_word_match {
        let inner = if is_regex { pattern } else { regex::escape(&pattern) };
        pattern = format!(r"\b(?:{inner})\b");
        is_regex = true;
    }

    (is_regex, pattern)
}

/// Normalize an exclude/include glob key per spec §4.5: backslashes to
/// forward slashes (preserving a UNC `\\server\share` prefix), and a
/// `C:/` drive root rewritten to `/`.
pub fn normalize_glob_key(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix("\\\\") {
        return format!("//{}", rest.replace('\\', "/"));
    }
    let normalized = raw.replace('\\', "/");
    if normalized.len() >= 2 && normalized.as_bytes()[1] == b':' {
        return format!("/{}", &normalized[2..]);
    }
    normalized
}

fn build_argv(
    folders: &[FolderQuery],
    extra_files: &[PathBuf],
    content: Option<&ContentPattern>,
    max_filesize: Option<u64>,
    follow_symlinks: bool,
) -> Vec<String> {
    let mut argv = vec![
        "--hidden".to_string(),
        "--heading".to_string(),
        "--line-number".to_string(),
        "--color".to_string(),
        "ansi".to_string(),
        "--colors".to_string(),
        "path:none".to_string(),
        "--colors".to_string(),
        "line:none".to_string(),
        "--colors".to_string(),
        "match:fg:red".to_string(),
        "--colors".to_string(),
        "match:style:nobold".to_string(),
    ];

    if let Some(content) = content {
        argv.push(if content.is_case_sensitive { "--case-sensitive" } else { "--ignore-case" }.to_string());
    }

    let shared_globs_hoisted = hoist_shared_globs(folders);
    for glob in &shared_globs_hoisted {
        argv.push("-g".to_string());
        argv.push(format!("!{}", normalize_glob_key(glob)));
    }
    for folder in folders {
        for (pattern, _) in &folder.exclude.entries {
            if shared_globs_hoisted.contains(pattern) {
                continue;
            }
            argv.push("-g".to_string());
            argv.push(format!("!{}", normalize_glob_key(pattern)));
        }
        for (pattern, _) in &folder.include.entries {
            argv.push("-g".to_string());
            argv.push(normalize_glob_key(pattern));
        }
    }

    if let Some(size) = max_filesize {
        argv.push("--max-filesize".to_string());
        argv.push(size.to_string());
    }

    let any_no_ignore = folders.iter().any(|f| f.disregard_ignore_files);
    if any_no_ignore {
        argv.push("--no-ignore".to_string());
    }

    if follow_symlinks {
        argv.push("--follow".to_string());
    }

    let shared_encoding = folders
        .first()
        .and_then(|f| f.encoding.as_deref())
        .filter(|enc| folders.iter().all(|f| f.encoding.as_deref() == Some(enc)));
    if let Some(encoding) = shared_encoding {
        argv.push("--encoding".to_string());
        argv.push(encoding.to_string());
    }

    argv.push("--no-config".to_string());
    argv.push("--no-ignore-global".to_string());

    if let Some(content) = content {
        let (is_regex, pattern) = synthesize_pattern_arg(content);
        argv.push(if is_regex { "--regexp" } else { "--fixed-strings" }.to_string());
        argv.push("--".to_string());
        argv.push(pattern);
    } else {
        argv.push("--files".to_string());
        argv.push("--".to_string());
    }

    for folder in folders {
        argv.push(folder.root.display().to_string());
    }
    for file in extra_files {
        argv.push(file.display().to_string());
    }

    argv
}

/// Globs shared across *all* folder queries and starting with `**` are
/// hoisted into a single pair of `-g` arguments rather than emitted per
/// folder (spec §4.5).
fn hoist_shared_globs(folders: &[FolderQuery]) -> Vec<String> {
    let Some(first) = folders.first() else { return Vec::new() };
    first
        .exclude
        .entries
        .keys()
        .filter(|k| k.starts_with("**"))
        .filter(|k| folders.iter().all(|f| f.exclude.entries.contains_key(*k)))
        .cloned()
        .collect()
}

/// Drives one child grep process end-to-end: spawn, stream stdout into the
/// parser, classify the exit, and return the fully-decoded matches.
pub async fn run(
    grep_binary: &Path,
    folders: &[FolderQuery],
    extra_files: &[PathBuf],
    content: Option<&ContentPattern>,
    max_filesize: Option<u64>,
    follow_symlinks: bool,
    max_results: Option<usize>,
    cancelled: Arc<AtomicBool>,
    mut on_match: impl FnMut(FileTextMatch),
) -> Result<DriverOutcome, SearchError> {
    let argv = build_argv(folders, extra_files, content, max_filesize, follow_symlinks);

    let mut cmd = Command::new(grep_binary);
    cmd.args(&argv);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        SearchError::child_crash(format!("failed to spawn {}: {e}", grep_binary.display()))
    })?;

    let mut stdout = child.stdout.take().ok_or_else(|| {
        SearchError::internal("grep child had no stdout handle")
    })?;
    let mut stderr = child.stderr.take().ok_or_else(|| {
        SearchError::internal("grep child had no stderr handle")
    })?;

    let fallback_path = extra_files.first().cloned();
    let mut parser = GrepParser::new(max_results, fallback_path);
    let mut buf = [0u8; 64 * 1024];
    let mut received_any = false;
    let mut hit_limit = false;

    loop {
        if cancelled.load(Ordering::Acquire) {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(SearchError::Cancelled);
        }

        let n = stdout.read(&mut buf).await.map_err(SearchError::from)?;
        if n == 0 {
            break;
        }
        received_any = true;
        for event in parser.feed(&buf[..n])? {
            match event {
                ParserEvent::Completed(m) => on_match(m),
                ParserEvent::HitLimit(m) => {
                    on_match(m);
                    hit_limit = true;
                }
            }
        }
        if hit_limit {
            let _ = child.start_kill();
            break;
        }
    }

    if !hit_limit {
        if let Some(last) = parser.flush()? {
            on_match(last);
        }
    }

    let mut stderr_text = String::new();
    let _ = stderr.read_to_string(&mut stderr_text).await;

    let status = child.wait().await.map_err(SearchError::from)?;

    if hit_limit {
        return Ok(DriverOutcome { hit_limit: true });
    }

    match status.code() {
        Some(0) => Ok(DriverOutcome { hit_limit: false }),
        Some(1) if received_any => Ok(DriverOutcome { hit_limit: false }), // success: "no further data" exit
        Some(code) => {
            let first_line = stderr_text.lines().next().unwrap_or_default();
            if is_whitelisted_fatal(first_line) {
                Err(SearchError::user_fatal(first_line.to_string()))
            } else {
                Err(SearchError::ChildCrash {
                    message: format!("command failed with code {code}: {stderr_text}"),
                    stack: None,
                })
            }
        }
        None => Err(SearchError::ChildCrash {
            message: format!("grep process terminated by signal: {stderr_text}"),
            stack: None,
        }),
    }
}

fn is_whitelisted_fatal(first_line: &str) -> bool {
    FATAL_STDERR_WHITELIST.iter().any(|prefix| first_line.contains(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ContentPattern;

    fn pattern(p: &str, is_regex: bool, word: bool) -> ContentPattern {
        ContentPattern {
            pattern: p.to_string(),
            is_regex,
            is_case_sensitive: true,
            is_word_match: word,
            word_separators: None,
        }
    }

    #[test]
    fn dollar_rewritten_for_regex() {
        let (is_regex, text) = synthesize_pattern_arg(&pattern("foo$", true, false));
        assert!(is_regex);
        assert_eq!(text, "foo\\r?$");
    }

    #[test]
    fn bare_dashdash_forces_escaped_regex() {
        let (is_regex, text) = synthesize_pattern_arg(&pattern("--", false, false));
        assert!(is_regex);
        assert_eq!(text, "\\-\\-");
    }

    #[test]
    fn word_match_wraps_with_boundaries() {
        let (is_regex, text) = synthesize_pattern_arg(&pattern("foo", false, true));
        assert!(is_regex);
        assert_eq!(text, r"\b(?:foo)\b");
    }

    #[test]
    fn unc_prefix_preserved_by_normalize() {
        assert_eq!(normalize_glob_key("\\\\server\\share\\x"), "//server/share/x");
    }

    #[test]
    fn drive_letter_rewritten_to_root() {
        assert_eq!(normalize_glob_key("C:\\Users\\x"), "/Users/x");
    }

    fn folder_with_exclude(root: &str, pattern: &str) -> FolderQuery {
        let mut folder = FolderQuery::new(root);
        folder.exclude = folder.exclude.with(pattern, crate::query::GlobRule::Always(true));
        folder
    }

    #[test]
    fn shared_glob_hoisted_as_negated_and_normalized() {
        let folders = vec![
            folder_with_exclude("/a", "**/node_modules/**"),
            folder_with_exclude("/b", "**/node_modules/**"),
        ];
        let argv = build_argv(&folders, &[], None, None, false);
        let glob_idx = argv.iter().position(|a| a == "-g").unwrap();
        assert_eq!(argv[glob_idx + 1], "!**/node_modules/**");
        // hoisted once, not again per-folder.
        assert_eq!(argv.iter().filter(|a| a.as_str() == "!**/node_modules/**").count(), 1);
    }

    #[test]
    fn hoisting_normalizes_like_the_per_folder_path() {
        let folders = vec![
            folder_with_exclude("/a", "**\\target\\**"),
            folder_with_exclude("/b", "**\\target\\**"),
        ];
        let argv = build_argv(&folders, &[], None, None, false);
        assert!(argv.windows(2).any(|w| w[0] == "-g" && w[1] == "!**/target/**"));
    }
}
