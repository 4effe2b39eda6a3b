//! File search: dispatches a query with no content pattern to the walker
//! (C3), then applies ranking (C7) and the prefix cache (C7) before
//! streaming results back through the service's progress channel.

use super::StreamItem;
use crate::config::EngineConfig;
use crate::error::SearchError;
use crate::glob_matcher::GlobMatcher;
use crate::query::{GlobExpr, SearchQuery};
use crate::result::{MatchItem, RawFileMatch, SearchStats, Terminal};
use crate::search::cache::{CachedResult, PrefixCache};
use crate::search::collector::BatchedCollector;
use crate::search::scoring::{self, FuzzyScorer};
use crate::walker::{self, BackendSelection, FilePatternTest, WalkBudget};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;

/// Chunk size for re-emitting an already-known result set (a cache hit, or
/// a sort-by-score pass that had to collect everything before ranking).
/// Unrelated to C6's own warm-up/timer tuning — here the whole set is
/// already in hand, so only the size boundary matters.
const BULK_EMIT_CHUNK: usize = 200;

pub fn run(
    cache: Arc<PrefixCache>,
    config: EngineConfig,
    query: SearchQuery,
    cancelled: Arc<AtomicBool>,
) -> mpsc::UnboundedReceiver<StreamItem> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let terminal = execute(&cache, &config, query, cancelled, &tx)
            .await
            .unwrap_or_else(|e| super::error_terminal(&e));
        let _ = tx.send(StreamItem::Terminal(terminal));
    });
    rx
}

async fn execute(
    cache: &PrefixCache,
    config: &EngineConfig,
    query: SearchQuery,
    cancelled: Arc<AtomicBool>,
    tx: &mpsc::UnboundedSender<StreamItem>,
) -> Result<Terminal, SearchError> {
    if let Some(cache_key) = query.cache_key.clone() {
        return execute_cached(cache, config, query, cache_key, tx).await;
    }

    let pattern = query.file_pattern.clone().unwrap_or_default();
    let stream_live = !query.sort_by_score;
    let live_tx = if stream_live { Some(tx) } else { None };

    let (matches, mut stats, limit_hit) = walk_all_folders(config, &query, cancelled, live_tx).await?;

    if !stream_live {
        let (ranked, sorting_time_ms) = rank(matches, &query, &pattern);
        stats.sorting_time_ms = Some(sorting_time_ms);
        stats.result_count = ranked.len() as u64;
        emit_bulk(tx, &ranked);
        return Ok(Terminal::Success { limit_hit, stats });
    }

    stats.result_count = matches.len() as u64;
    Ok(Terminal::Success { limit_hit, stats })
}

/// Apply `sort_by_score` ranking (or a plain truncation to `max_results`
/// when unsorted) to a fully-collected result list. Returns the result
/// plus the milliseconds spent sorting, for the stats terminal.
fn rank(mut matches: Vec<RawFileMatch>, query: &SearchQuery, pattern: &str) -> (Vec<RawFileMatch>, u64) {
    let sort_start = Instant::now();
    let cap = query.max_results.unwrap_or(matches.len());
    if query.sort_by_score && !pattern.is_empty() {
        let mut scorer = FuzzyScorer::new();
        matches = scoring::top_k(matches, cap, &mut scorer, pattern, |m| m.relative_path.as_str());
    } else if matches.len() > cap {
        matches.truncate(cap);
    }
    (matches, sort_start.elapsed().as_millis() as u64)
}

async fn execute_cached(
    cache: &PrefixCache,
    config: &EngineConfig,
    query: SearchQuery,
    cache_key: String,
    tx: &mpsc::UnboundedSender<StreamItem>,
) -> Result<Terminal, SearchError> {
    let pattern = query.file_pattern.clone().unwrap_or_default();

    // Narrowing reuse (spec §4.7): an existing row — including one for
    // this exact pattern — whose pattern `pattern` narrows is filtered and
    // re-sorted rather than re-walked.
    if let Some((_, row)) = cache.find_narrowing(&cache_key, &pattern) {
        let cached = row.get().await;
        let sort_start = Instant::now();
        let mut filtered: Vec<RawFileMatch> = cached
            .matches
            .iter()
            .filter(|m| scoring::quick_filter(&m.relative_path, &pattern))
            .cloned()
            .collect();
        let cap = query.max_results.unwrap_or(filtered.len());
        let was_truncated = filtered.len() > cap;
        if query.sort_by_score && !pattern.is_empty() {
            let mut scorer = FuzzyScorer::new();
            filtered = scoring::top_k(filtered, cap, &mut scorer, &pattern, |m| m.relative_path.as_str());
        } else if was_truncated {
            filtered.truncate(cap);
        }
        let sorting_time_ms = sort_start.elapsed().as_millis() as u64;
        let limit_hit = cached.limit_hit || was_truncated;

        emit_bulk(tx, &filtered);
        let stats = SearchStats {
            sorting_time_ms: Some(sorting_time_ms),
            from_cache: Some(true),
            result_count: filtered.len() as u64,
            files_walked: filtered.len() as u64,
            cmd_result_count: filtered.len() as u64,
            ..SearchStats::default()
        };
        return Ok(Terminal::Success { limit_hit, stats });
    }

    // No row narrows this pattern: spawn a fresh, detached walk (spec §9 —
    // this task outlives the cancellation of the request that started it).
    let query_for_producer = query.clone();
    let config_for_producer = config.clone();
    let (row, existed) = cache.get_or_spawn(&cache_key, &pattern, move || async move {
        let never_cancelled = Arc::new(AtomicBool::new(false));
        match walk_all_folders(&config_for_producer, &query_for_producer, never_cancelled, None).await {
            Ok((matches, _stats, limit_hit)) => Arc::new(CachedResult { matches, limit_hit }),
            Err(e) => {
                log::warn!("cache row producer for pattern '{pattern}' failed: {e}");
                Arc::new(CachedResult { matches: Vec::new(), limit_hit: false })
            }
        }
    });

    let cached = row.get().await;
    emit_bulk(tx, &cached.matches);
    let stats = SearchStats {
        from_cache: Some(existed),
        result_count: cached.matches.len() as u64,
        files_walked: cached.matches.len() as u64,
        cmd_result_count: cached.matches.len() as u64,
        ..SearchStats::default()
    };
    Ok(Terminal::Success { limit_hit: cached.limit_hit, stats })
}

/// Walk every folder query in parallel (spec §4.3: "across roots, the
/// walker proceeds in parallel; completion is signalled when every root
/// has finished"), merge in the extra (loose) files, and optionally
/// stream each match live through `live_tx` as it's discovered — used by
/// the unsorted, non-cached path for early responsiveness (spec §4.6's
/// "first results visible fast" rationale applies one level up here too).
async fn walk_all_folders(
    config: &EngineConfig,
    query: &SearchQuery,
    cancelled: Arc<AtomicBool>,
    live_tx: Option<&mpsc::UnboundedSender<StreamItem>>,
) -> Result<(Vec<RawFileMatch>, SearchStats, bool), SearchError> {
    let walk_start = Instant::now();

    let global_exclude = Arc::new(GlobMatcher::compile(&query.global_exclude)?);
    let global_include = Arc::new(GlobMatcher::compile(&query.global_include)?);

    let pattern = query.file_pattern.clone().unwrap_or_default();
    let file_pattern_test: Option<Arc<FilePatternTest>> = if pattern.is_empty() {
        None
    } else {
        let needle = pattern.clone();
        Some(Arc::new(move |candidate: &str| scoring::quick_filter(candidate, &needle)))
    };

    let budget = Arc::new(WalkBudget::new(
        query.max_results,
        query.exists_only,
        query.max_filesize,
        Arc::clone(&cancelled),
    ));
    let grep_binary: Arc<Path> = Arc::from(config.grep_binary.as_path());
    let backend = walker::choose_backend(&BackendSelection {
        grep_available: walker::probe_grep_available(&config.grep_binary),
        posix_find_available: cfg!(any(target_os = "linux", target_os = "macos")),
        max_filesize: query.max_filesize,
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<RawFileMatch>();
    let mut handles = Vec::with_capacity(query.folder_queries.len());
    for folder in &query.folder_queries {
        let exclude = Arc::new(GlobMatcher::compile(&merge_glob(&query.global_exclude, &folder.exclude))?);
        let include = Arc::new(GlobMatcher::compile(&merge_glob(&query.global_include, &folder.include))?);
        let folder = folder.clone();
        let budget = Arc::clone(&budget);
        let grep_binary = Arc::clone(&grep_binary);
        let file_pattern_test = file_pattern_test.clone();
        let tx = tx.clone();
        let follow_symlinks = query.follow_symlinks;
        handles.push(tokio::spawn(async move {
            walker::walk_root(
                folder,
                include,
                exclude,
                file_pattern_test,
                budget,
                backend,
                grep_binary,
                follow_symlinks,
                tx,
            )
            .await
        }));
    }
    drop(tx);

    let mut matches = Vec::new();
    let mut collector = live_tx.map(|_| BatchedCollector::with_defaults(BULK_EMIT_CHUNK));
    while let Some(m) = rx.recv().await {
        if let (Some(tx), Some(collector)) = (live_tx, collector.as_mut()) {
            if let Some(batch) = collector.add(to_match_item(&m)) {
                send_batch(tx, batch);
            }
        }
        matches.push(m);
    }
    if let (Some(tx), Some(collector)) = (live_tx, collector.as_mut()) {
        if let Some(batch) = collector.flush() {
            send_batch(tx, batch);
        }
    }

    // Spec §7 propagation policy: one root's error aborts only that root;
    // others continue. The first root error is remembered and surfaced
    // only if the whole search produced nothing.
    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(SearchError::Cancelled)) => return Err(SearchError::Cancelled),
            Ok(Err(e)) => {
                log::warn!("folder root traversal failed: {e}");
                first_error.get_or_insert(e);
            }
            Err(e) => log::warn!("walker task panicked: {e}"),
        }
    }

    let extra = walker::filter_extra_files(
        &query.extra_files,
        &global_include,
        &global_exclude,
        file_pattern_test.as_deref(),
    );
    if let (Some(tx), Some(collector)) = (live_tx, collector.as_mut()) {
        for m in &extra {
            if let Some(batch) = collector.add(to_match_item(m)) {
                send_batch(tx, batch);
            }
        }
        if let Some(batch) = collector.flush() {
            send_batch(tx, batch);
        }
    }
    matches.extend(extra);

    if matches.is_empty() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    let file_walk_time_ms = walk_start.elapsed().as_millis() as u64;
    let stats = SearchStats {
        traversal_ms: file_walk_time_ms,
        file_walk_time_ms,
        files_walked: matches.len() as u64,
        cmd_result_count: matches.len() as u64,
        result_count: matches.len() as u64,
        ..SearchStats::default()
    };
    let limit_hit = budget.limit_hit.load(Ordering::Acquire);
    Ok((matches, stats, limit_hit))
}

fn merge_glob(global: &GlobExpr, local: &GlobExpr) -> GlobExpr {
    let mut merged = global.clone();
    for (pattern, rule) in &local.entries {
        merged.entries.insert(pattern.clone(), rule.clone());
    }
    merged
}

fn to_match_item(m: &RawFileMatch) -> MatchItem {
    MatchItem { path: m.absolute_path().display().to_string(), matches: None }
}

fn send_batch(tx: &mpsc::UnboundedSender<StreamItem>, batch: Vec<MatchItem>) {
    for item in batch {
        let _ = tx.send(StreamItem::Match(item));
    }
}

fn emit_bulk(tx: &mpsc::UnboundedSender<StreamItem>, matches: &[RawFileMatch]) {
    // No warm-up here (unlike `with_defaults`): the whole result set is
    // already known, so there's no "first results fast" benefit to single-
    // item batches — only the size boundary matters.
    let mut collector = BatchedCollector::new(0, BULK_EMIT_CHUNK, crate::config::BATCH_FLUSH_INTERVAL);
    for m in matches {
        if let Some(batch) = collector.add(to_match_item(m)) {
            send_batch(tx, batch);
        }
    }
    if let Some(batch) = collector.flush() {
        send_batch(tx, batch);
    }
}
