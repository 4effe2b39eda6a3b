//! Search Service (C8): accepts queries, dispatches to the walker (C3) or
//! grep driver (C5), applies sort + cache (C7), and exposes a cancellable
//! progress stream (spec §4.8).
//!
//! Modeled on the teacher's `manager/core/mod.rs`: a small `Clone`able
//! facade over shared state (here, the process-wide prefix cache) that
//! delegates each public operation to a focused submodule, the way
//! `SearchManager` delegates to `cleanup`/`operations`/`session`/`spawn`.

mod file_search;
mod text_search;

use crate::config::EngineConfig;
use crate::error::SearchError;
use crate::query::SearchQuery;
use crate::result::{InfoItem, MatchItem, Terminal};
use crate::search::cache::PrefixCache;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};

/// One item on a search's progress stream (spec §6 wire format): a file
/// match, an informational progress update, or the terminal item that
/// always closes the stream exactly once.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Match(MatchItem),
    Info(InfoItem),
    Terminal(Terminal),
}

/// A handle a caller uses to cancel a single in-flight `search()` call.
/// Cancellation is idempotent and synchronous from the caller's view
/// (spec §5): calling `cancel()` more than once, or after the search has
/// already finished, is a no-op.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

fn new_cancellation() -> (CancelHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, rx)
}

/// Bridges the `watch`-based cancellation handle callers hold to the
/// `Arc<AtomicBool>` the walker (C3) and grep driver (C5) poll on their
/// hot paths, so those modules don't need to depend on `tokio::sync::watch`
/// directly. The bridging task exits as soon as cancellation fires or the
/// sender side is dropped.
fn bridge_cancellation(mut rx: watch::Receiver<bool>) -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(*rx.borrow()));
    let flag2 = Arc::clone(&flag);
    tokio::spawn(async move {
        loop {
            if *rx.borrow() {
                flag2.store(true, Ordering::Release);
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    });
    flag
}

/// The core search subsystem's public entry point (spec §4.8).
#[derive(Clone)]
pub struct SearchService {
    config: EngineConfig,
    cache: Arc<PrefixCache>,
}

impl SearchService {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, cache: Arc::new(PrefixCache::new()) }
    }

    /// Fill in defaults the caller omitted (currently: `max_results`,
    /// capped at this service's `hard_max_results`). Idempotent — calling
    /// it twice on an already-extended query changes nothing.
    pub fn extend_query(&self, query: &mut SearchQuery) {
        let requested = query.max_results.unwrap_or(crate::config::DEFAULT_MAX_RESULTS);
        query.max_results = Some(requested.min(self.config.hard_max_results));
    }

    /// Evict every cache row under `key` (spec §4.8 `clearCache`).
    pub fn clear_cache(&self, key: &str) {
        self.cache.clear(key);
    }

    /// Dispatch `query` to the file-search or text-search engine depending
    /// on whether a content pattern is present, returning a progress
    /// channel and a handle to cancel it. The channel always ends with
    /// exactly one [`StreamItem::Terminal`].
    pub fn search(&self, mut query: SearchQuery) -> (mpsc::UnboundedReceiver<StreamItem>, CancelHandle) {
        self.extend_query(&mut query);
        let (handle, rx) = new_cancellation();
        let cancelled = bridge_cancellation(rx);

        let stream = if query.is_content_search() {
            text_search::run(self.config.clone(), query, cancelled)
        } else {
            file_search::run(Arc::clone(&self.cache), self.config.clone(), query, cancelled)
        };

        (stream, handle)
    }
}

/// Turns any [`SearchError`] into the terminal item spec §6/§7 describe,
/// special-casing cancellation's distinguished message.
fn error_terminal(err: &SearchError) -> Terminal {
    Terminal::Error { error: crate::result::TerminalError::from(err) }
}
