//! Text search: drives the grep driver (C5) directly (no walker involved —
//! the driver's own `--files`-less invocation does its own traversal),
//! applying the file-name pattern as an auxiliary filter over the driver's
//! match stream (spec §3: "an auxiliary filter applied to text search's
//! candidate files") and clipping each preview to the query's context
//! window before batching it onto the progress channel.

use super::StreamItem;
use crate::config::EngineConfig;
use crate::error::SearchError;
use crate::grep::driver;
use crate::query::{PreviewOptions, SearchQuery};
use crate::result::{FileTextMatch, MatchItem, MatchRange, PreviewMatch, SearchStats, Terminal};
use crate::search::collector::BatchedCollector;
use crate::search::scoring;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tokio::sync::mpsc;

const BATCH_SIZE: usize = 100;

pub fn run(
    config: EngineConfig,
    query: SearchQuery,
    cancelled: Arc<AtomicBool>,
) -> mpsc::UnboundedReceiver<StreamItem> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let terminal = execute(&config, query, cancelled, &tx)
            .await
            .unwrap_or_else(|e| super::error_terminal(&e));
        let _ = tx.send(StreamItem::Terminal(terminal));
    });
    rx
}

async fn execute(
    config: &EngineConfig,
    query: SearchQuery,
    cancelled: Arc<AtomicBool>,
    tx: &mpsc::UnboundedSender<StreamItem>,
) -> Result<Terminal, SearchError> {
    let content = query
        .content
        .as_ref()
        .ok_or_else(|| SearchError::internal("text_search::run called without a content pattern"))?
        .clone();
    let file_pattern = query.file_pattern.clone().unwrap_or_default();
    let preview = query.preview;

    let start = Instant::now();
    let mut collector = BatchedCollector::with_defaults(BATCH_SIZE);
    let mut cmd_result_count = 0u64;
    let mut result_count = 0u64;

    let outcome = driver::run(
        &config.grep_binary,
        &query.folder_queries,
        &query.extra_files,
        Some(&content),
        query.max_filesize,
        query.follow_symlinks,
        query.max_results,
        Arc::clone(&cancelled),
        |m: FileTextMatch| {
            cmd_result_count += 1;
            if !file_pattern.is_empty() {
                let basename = m
                    .absolute_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                if !scoring::quick_filter(basename, &file_pattern) {
                    return;
                }
            }
            result_count += 1;
            if let Some(batch) = collector.add(to_match_item(&m, &preview)) {
                send_batch(tx, batch);
            }
        },
    )
    .await?;

    if let Some(batch) = collector.flush() {
        send_batch(tx, batch);
    }

    let cmd_time_ms = start.elapsed().as_millis() as u64;
    let stats = SearchStats {
        traversal_ms: cmd_time_ms,
        cmd_time_ms,
        cmd_result_count,
        result_count,
        ..SearchStats::default()
    };
    Ok(Terminal::Success { limit_hit: outcome.hit_limit, stats })
}

fn to_match_item(m: &FileTextMatch, preview: &PreviewOptions) -> MatchItem {
    let matches = m.matches.iter().map(|pm| clip(pm, preview)).collect();
    MatchItem { path: m.absolute_path.display().to_string(), matches: Some(matches) }
}

/// Trim a match's preview line down to `max_chars_before`/`max_chars_after`
/// of context around the matched range, re-basing the column offsets to
/// the clipped string (spec §3 `PreviewOptions`).
fn clip(m: &PreviewMatch, opts: &PreviewOptions) -> PreviewMatch {
    let chars: Vec<char> = m.preview.chars().collect();
    let start = m.range.start_col as usize;
    let end = (m.range.end_col as usize).min(chars.len());
    let window_start = start.saturating_sub(opts.max_chars_before);
    let window_end = end.saturating_add(opts.max_chars_after).min(chars.len());

    let clipped: String = chars[window_start..window_end].iter().collect();
    PreviewMatch {
        preview: clipped,
        range: MatchRange {
            line: m.range.line,
            start_col: (start - window_start) as u32,
            end_col: (end - window_start) as u32,
        },
    }
}

fn send_batch(tx: &mpsc::UnboundedSender<StreamItem>, batch: Vec<MatchItem>) {
    for item in batch {
        let _ = tx.send(StreamItem::Match(item));
    }
}
