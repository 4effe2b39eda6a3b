//! Grep Parser (C4): a stateful line-oriented decoder for grep's
//! colorized output (spec §4.4).
//!
//! The escape-delimited match markers are treated as a small state machine
//! with three states — `Outside`, `InsideMatch`, `AtEscape` — rather than
//! the ad-hoc substring arithmetic the design notes (spec §9) call out as
//! the thing to avoid.

use crate::error::SearchError;
use crate::result::{FileTextMatch, MatchRange, PreviewMatch};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

const MATCH_START: &str = "\x1b[0m\x1b[31m";
const MATCH_END: &str = "\x1b[0m";
const UTF8_BOM: &str = "\u{feff}";

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\x1b\[0m(.+)\x1b\[0m$").unwrap());
static RESULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\x1b\[0m(\d+)\x1b\[0m:(.*)$").unwrap());

/// The scan state while walking one result line's text, stripping match
/// markers and recording ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    InsideMatch,
    AtEscape,
}

/// An event the parser produces as it consumes a byte stream. Most calls
/// to [`GrepParser::feed`] produce zero or one [`Completed`](ParserEvent::Completed)
/// events; [`HitLimit`](ParserEvent::HitLimit) fires exactly once, after
/// which the driver is expected to cancel the child process.
#[derive(Debug, Clone)]
pub enum ParserEvent {
    Completed(FileTextMatch),
    HitLimit(FileTextMatch),
}

struct InProgress {
    path: PathBuf,
    matches: Vec<PreviewMatch>,
}

/// Decodes a byte stream of `rg`'s heading-style colorized output into
/// [`FileTextMatch`] records.
pub struct GrepParser {
    carry: Vec<u8>,
    current: Option<InProgress>,
    seen_first_line: bool,
    max_results: Option<usize>,
    emitted: usize,
    /// Used to synthesize a header when the child searched a single loose
    /// file and emitted no heading line at all (spec §4.4 edge case).
    fallback_path: Option<PathBuf>,
    hit_limit: bool,
}

impl GrepParser {
    pub fn new(max_results: Option<usize>, fallback_path: Option<PathBuf>) -> Self {
        Self {
            carry: Vec::new(),
            current: None,
            seen_first_line: false,
            max_results,
            emitted: 0,
            fallback_path,
            hit_limit: false,
        }
    }

    /// Feed one chunk of the child's stdout. Chunk assembly rule (spec
    /// §4.4): join the carried-over remainder with the new chunk, split on
    /// `\r?\n`, carry the last (possibly incomplete) line forward.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<ParserEvent>, SearchError> {
        if self.hit_limit {
            return Ok(Vec::new());
        }

        self.carry.extend_from_slice(chunk);
        let mut events = Vec::new();

        loop {
            let Some(nl_pos) = self.carry.iter().position(|&b| b == b'\n') else { break };
            let mut line: Vec<u8> = self.carry.drain(..=nl_pos).collect();
            line.pop(); // drop '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if let Some(event) = self.process_line(&line)? {
                let hit_limit = matches!(event, ParserEvent::HitLimit(_));
                events.push(event);
                if hit_limit {
                    self.hit_limit = true;
                    return Ok(events);
                }
            }
        }

        Ok(events)
    }

    /// Flush any remaining carried-over partial line and the in-progress
    /// file match. A flush that finds no known file (no header ever seen
    /// and no fallback path) while there is leftover output is a fatal
    /// internal error per spec §4.4.
    pub fn flush(&mut self) -> Result<Option<FileTextMatch>, SearchError> {
        if !self.carry.is_empty() {
            let line = std::mem::take(&mut self.carry);
            let mut line = line;
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.process_line(&line)? {
                match event {
                    ParserEvent::Completed(m) | ParserEvent::HitLimit(m) => return Ok(Some(m)),
                }
            }
        }

        Ok(self.current.take().map(|p| FileTextMatch {
            absolute_path: p.path,
            matches: p.matches,
        }))
    }

    fn process_line(&mut self, line_bytes: &[u8]) -> Result<Option<ParserEvent>, SearchError> {
        let mut text = String::from_utf8_lossy(line_bytes).into_owned();
        if !self.seen_first_line {
            self.seen_first_line = true;
            if let Some(stripped) = text.strip_prefix(UTF8_BOM) {
                text = stripped.to_string();
            }
        }

        if let Some(caps) = HEADER_RE.captures(&text) {
            let path = PathBuf::from(&caps[1]);
            return Ok(self.start_new_file(path));
        }

        if let Some(caps) = RESULT_RE.captures(&text) {
            let line_number: u32 = caps[1].parse().map_err(|_| {
                SearchError::internal(format!("unparseable line number in: {text}"))
            })? ;
            let line_number = line_number.saturating_sub(1);
            let rest = &caps[2];

            if self.current.is_none() {
                let path = self.fallback_path.clone().ok_or_else(|| {
                    SearchError::internal(
                        "result line parsed before any file header or fallback path was known",
                    )
                })?;
                self.current = Some(InProgress { path, matches: Vec::new() });
            }

            let ranges = scan_line(rest, line_number);
            if let Some(current) = &mut self.current {
                for m in ranges {
                    current.matches.push(m);
                    self.emitted += 1;
                    if let Some(max) = self.max_results {
                        if self.emitted >= max {
                            let completed = FileTextMatch {
                                absolute_path: current.path.clone(),
                                matches: std::mem::take(&mut current.matches),
                            };
                            self.current = None;
                            return Ok(Some(ParserEvent::HitLimit(completed)));
                        }
                    }
                }
            }
            return Ok(None);
        }

        // Neither header nor result pattern: a blank separator line between
        // files, or ripgrep's own informational output. Not an error.
        Ok(None)
    }

    fn start_new_file(&mut self, path: PathBuf) -> Option<ParserEvent> {
        let previous = self.current.take().map(|p| FileTextMatch {
            absolute_path: p.path,
            matches: p.matches,
        });
        self.current = Some(InProgress { path, matches: Vec::new() });
        previous.map(ParserEvent::Completed)
    }
}

/// Walk one de-prefixed result line, stripping `MATCH_START`/`MATCH_END`
/// markers and recording a [`MatchRange`] + [`PreviewMatch`] per pair.
/// Column positions are counted in characters of the rendered (marker
/// stripped) text, matching the `preview` string's own indexing.
fn scan_line(line: &str, line_number: u32) -> Vec<PreviewMatch> {
    let mut state = ScanState::Outside;
    let mut preview = String::new();
    let mut ranges = Vec::new();
    let mut pending_start: Option<u32> = None;

    let bytes = line.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let remainder = &line[i..];
        if state != ScanState::AtEscape && remainder.starts_with(MATCH_START) {
            state = ScanState::InsideMatch;
            pending_start = Some(preview.chars().count() as u32);
            i += MATCH_START.len();
            continue;
        }
        if state == ScanState::InsideMatch && remainder.starts_with(MATCH_END) {
            let end = preview.chars().count() as u32;
            if let Some(start) = pending_start.take() {
                ranges.push(PreviewMatch {
                    preview: preview.clone(),
                    range: MatchRange { line: line_number, start_col: start, end_col: end },
                });
            }
            state = ScanState::Outside;
            i += MATCH_END.len();
            continue;
        }

        let ch = remainder.chars().next().unwrap_or('\u{FFFD}');
        preview.push(ch);
        i += ch.len_utf8();
    }

    // A `\r` immediately before end-of-line was already stripped by the
    // caller; if that left us still `InsideMatch`, synthesize the missing
    // MATCH_END so the trailing match isn't lost (spec §4.4 edge case).
    if state == ScanState::InsideMatch {
        if let Some(start) = pending_start {
            let end = preview.chars().count() as u32;
            ranges.push(PreviewMatch {
                preview: preview.clone(),
                range: MatchRange { line: line_number, start_col: start, end_col: end },
            });
        }
    }

    // Every range in `ranges` currently carries the *final* preview string
    // rather than a per-range snapshot, matching spec §4.4 ("a preview
    // string is produced by concatenating every non-marker slice") — one
    // preview per line, shared by every range on that line.
    let final_preview = preview;
    ranges
        .into_iter()
        .map(|m| PreviewMatch { preview: final_preview.clone(), ..m })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(path: &str) -> Vec<u8> {
        format!("\x1b[0m{path}\x1b[0m\n").into_bytes()
    }

    fn result_line(n: u32, text: &str) -> Vec<u8> {
        format!("\x1b[0m{n}\x1b[0m:{text}\n").into_bytes()
    }

    #[test]
    fn header_then_single_match() {
        let mut parser = GrepParser::new(None, None);
        let mut events = Vec::new();
        events.extend(parser.feed(&line("/fx/a.txt")).unwrap());
        events.extend(
            parser
                .feed(&result_line(3, &format!("hello {MATCH_START}world{MATCH_END}!")))
                .unwrap(),
        );
        assert!(events.is_empty());

        let completed = parser.flush().unwrap().unwrap();
        assert_eq!(completed.absolute_path, PathBuf::from("/fx/a.txt"));
        assert_eq!(completed.matches.len(), 1);
        assert_eq!(completed.matches[0].range.line, 2);
        assert_eq!(completed.matches[0].range.start_col, 6);
        assert_eq!(completed.matches[0].range.end_col, 11);
        assert_eq!(completed.matches[0].preview, "hello world!");
    }

    #[test]
    fn second_header_flushes_first_file() {
        let mut parser = GrepParser::new(None, None);
        let mut events = Vec::new();
        events.extend(parser.feed(&line("/fx/a.txt")).unwrap());
        events.extend(
            parser
                .feed(&result_line(1, &format!("{MATCH_START}x{MATCH_END}")))
                .unwrap(),
        );
        events.extend(parser.feed(&line("/fx/b.txt")).unwrap());

        assert_eq!(events.len(), 1);
        match &events[0] {
            ParserEvent::Completed(m) => assert_eq!(m.absolute_path, PathBuf::from("/fx/a.txt")),
            _ => panic!("expected Completed"),
        }
    }

    #[test]
    fn hit_limit_stops_after_max_results() {
        let mut parser = GrepParser::new(Some(1), None);
        let mut events = Vec::new();
        events.extend(parser.feed(&line("/fx/a.txt")).unwrap());
        events.extend(
            parser
                .feed(&result_line(1, &format!("{MATCH_START}x{MATCH_END} {MATCH_START}y{MATCH_END}")))
                .unwrap(),
        );
        assert!(matches!(events.last(), Some(ParserEvent::HitLimit(_))));
    }

    #[test]
    fn header_less_input_uses_fallback_path() {
        let fallback = PathBuf::from("/fx/only.txt");
        let mut parser = GrepParser::new(None, Some(fallback.clone()));
        parser
            .feed(&result_line(1, &format!("{MATCH_START}x{MATCH_END}")))
            .unwrap();
        let completed = parser.flush().unwrap().unwrap();
        assert_eq!(completed.absolute_path, fallback);
    }
}
