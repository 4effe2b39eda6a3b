//! Result and wire types (spec §3: Raw file match, File text match; §6:
//! produced progress-stream wire format).

use serde::{Deserialize, Serialize};

/// `{ base, relativePath, basename, size? }` — spec §3 invariant:
/// `base.join(relative_path) == absolute_path` and
/// `basename == leafname(relative_path)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFileMatch {
    pub base: std::path::PathBuf,
    pub relative_path: String,
    pub basename: String,
    pub size: Option<u64>,
    pub modified: Option<std::time::SystemTime>,
    pub accessed: Option<std::time::SystemTime>,
    pub created: Option<std::time::SystemTime>,
}

impl RawFileMatch {
    pub fn absolute_path(&self) -> std::path::PathBuf {
        self.base.join(&self.relative_path)
    }
}

/// A 0-based, end-exclusive character range within a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRange {
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

/// A single match within a file, with its rendered preview line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMatch {
    pub preview: String,
    pub range: MatchRange,
}

/// `{ absolutePath, matches: [...] }` — spec §3. Invariant: ranges within a
/// file are produced in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTextMatch {
    pub absolute_path: std::path::PathBuf,
    pub matches: Vec<PreviewMatch>,
}

/// Wire shape of a single progress-stream match item (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchItem {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<PreviewMatch>>,
}

/// Wire shape of an informational progress item (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InfoItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worked: Option<u64>,
}

/// A single item on the progress stream: either a match or an informational
/// update. The terminal item always arrives separately as [`Terminal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressItem {
    Match(MatchItem),
    Info(InfoItem),
}

/// Timing and volume counters reported on the success terminal (spec §6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub traversal_ms: u64,
    pub file_walk_time_ms: u64,
    pub cmd_time_ms: u64,
    pub directories_walked: u64,
    pub files_walked: u64,
    pub cmd_result_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorting_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_cache: Option<bool>,
    pub result_count: u64,
}

/// `{message, stack?}` carried by the error terminal (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Exactly one of these closes every progress stream (spec §4.8). The
/// container-level `rename_all` governs the `type` tag's casing
/// (`"success"`/`"error"`); each struct variant gets its own
/// `rename_all = "camelCase"` so its fields match spec §6 independently of
/// the tag casing (serde applies the two at different levels).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Terminal {
    #[serde(rename_all = "camelCase")]
    Success { limit_hit: bool, stats: SearchStats },
    Error { error: TerminalError },
}

impl From<&crate::error::SearchError> for TerminalError {
    fn from(err: &crate::error::SearchError) -> Self {
        let stack = match err {
            crate::error::SearchError::ChildCrash { stack, .. } => stack.clone(),
            _ => None,
        };
        Self { message: err.to_string(), stack }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_range_serializes_camel_case() {
        let range = MatchRange { line: 0, start_col: 1, end_col: 4 };
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, r#"{"line":0,"startCol":1,"endCol":4}"#);
    }

    #[test]
    fn search_stats_serializes_camel_case() {
        let stats = SearchStats { result_count: 3, ..SearchStats::default() };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"resultCount\":3"));
        assert!(json.contains("\"traversalMs\""));
        assert!(json.contains("\"fileWalkTimeMs\""));
        assert!(json.contains("\"cmdResultCount\""));
        assert!(!json.contains("result_count"));
    }

    #[test]
    fn terminal_success_tag_is_snake_case_fields_are_camel_case() {
        let terminal = Terminal::Success { limit_hit: true, stats: SearchStats::default() };
        let json = serde_json::to_string(&terminal).unwrap();
        assert!(json.contains("\"type\":\"success\""));
        assert!(json.contains("\"limitHit\":true"));
        assert!(!json.contains("limit_hit"));
    }
}
