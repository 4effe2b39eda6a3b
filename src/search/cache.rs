//! Scoring & Cache (C7), cache half: a prefix-search result cache with
//! narrowing reuse (spec §4.7), keyed by a caller-opaque cache key
//! (typically a workspace id — glossary: "cache key").
//!
//! Resolution of the Open Question in spec §9/`SPEC_FULL.md` §9: a fresh
//! row's producer is handed to `tokio::spawn` the moment the row is
//! created, independent of the request that created it. A [`CacheRow`]
//! itself just holds a `Shared` handle onto that spawned task's result.
//! Dropping every awaiter of a row (e.g. the creating request was
//! cancelled) stops nothing — the `tokio::spawn`ed task keeps running to
//! completion regardless, so a later narrowing query can still await the
//! same in-flight result. This directly implements "cache rows must
//! outlive their creator's cancellation" without a `preventCancellation`-
//! style suppression flag.

use crate::result::RawFileMatch;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A completed file-search result set, as stored in a cache row.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub matches: Vec<RawFileMatch>,
    pub limit_hit: bool,
}

/// `{ resultsPromise, progressStream, resolved }` of spec §3, minus the
/// progress stream (cache rows are only consulted after a search
/// completes — nothing replays progress to a cache hit). Cloning a
/// `CacheRow` shares the same underlying task result; a row resolves
/// exactly once (spec §3 invariant), enforced by `tokio::spawn` running
/// its future to completion exactly once regardless of how many clones of
/// this handle exist or are dropped.
#[derive(Clone)]
pub struct CacheRow {
    shared: Shared<BoxFuture<'static, Arc<CachedResult>>>,
}

impl CacheRow {
    /// `true` once the underlying task has produced a value. Cloning and
    /// polling are cheap after that — `Shared` caches the output.
    pub fn is_resolved(&self) -> bool {
        self.shared.peek().is_some()
    }

    /// Await this row's result. Many callers may await the same row
    /// concurrently (narrowing queries reusing one cached row); each gets
    /// its own clone of the eventual `Arc<CachedResult>`.
    pub async fn get(&self) -> Arc<CachedResult> {
        self.shared.clone().await
    }
}

/// Whether `new_pattern` narrows `cached_pattern` (spec §4.7 / glossary
/// "narrowing query"): the new pattern must extend the cached one as a
/// prefix, and must not introduce a path separator the cached pattern
/// lacked (that widens the search domain rather than narrowing it).
pub fn narrows(cached_pattern: &str, new_pattern: &str) -> bool {
    if !new_pattern.starts_with(cached_pattern) {
        return false;
    }
    let new_has_sep = new_pattern.contains('/') || new_pattern.contains('\\');
    let cached_has_sep = cached_pattern.contains('/') || cached_pattern.contains('\\');
    !(new_has_sep && !cached_has_sep)
}

/// Keyed by caller-supplied cache key, each cache holds a mapping from
/// `filePattern -> CacheRow` (spec §3). Process-wide and append-only
/// except on `clear`; a plain `Mutex` suffices since every critical
/// section here is O(1) map work with no `.await` inside it.
#[derive(Default)]
pub struct PrefixCache {
    rows: Mutex<HashMap<String, HashMap<String, CacheRow>>>,
}

impl PrefixCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the best (longest) cached pattern under `cache_key` that
    /// `pattern` narrows, if any — including an exact match (every pattern
    /// narrows itself).
    pub fn find_narrowing(&self, cache_key: &str, pattern: &str) -> Option<(String, CacheRow)> {
        let rows = self.rows.lock().expect("prefix cache mutex poisoned");
        let bucket = rows.get(cache_key)?;
        bucket
            .iter()
            .filter(|(cached, _)| narrows(cached, pattern))
            .max_by_key(|(cached, _)| cached.len())
            .map(|(k, row)| (k.clone(), row.clone()))
    }

    /// Get the existing row for the exact `(cache_key, pattern)` pair, or
    /// spawn `produce` onto an independent task and register its row if
    /// none exists yet. Returns the row plus whether it already existed
    /// (a true cache hit) so the caller can report `fromCache` correctly.
    pub fn get_or_spawn<F, Fut>(
        &self,
        cache_key: &str,
        pattern: &str,
        produce: F,
    ) -> (CacheRow, bool)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Arc<CachedResult>> + Send + 'static,
    {
        let mut rows = self.rows.lock().expect("prefix cache mutex poisoned");
        let bucket = rows.entry(cache_key.to_string()).or_default();
        if let Some(existing) = bucket.get(pattern) {
            return (existing.clone(), true);
        }

        let handle = tokio::spawn(produce());
        let shared: Shared<BoxFuture<'static, Arc<CachedResult>>> = async move {
            handle.await.unwrap_or_else(|e| {
                log::warn!("cache row producer task failed: {e}");
                Arc::new(CachedResult { matches: Vec::new(), limit_hit: false })
            })
        }
        .boxed()
        .shared();

        let row = CacheRow { shared };
        bucket.insert(pattern.to_string(), row.clone());
        (row, false)
    }

    /// Evict every row under `cache_key`.
    pub fn clear(&self, cache_key: &str) {
        self.rows.lock().expect("prefix cache mutex poisoned").remove(cache_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn narrowing_requires_prefix_and_non_increasing_separator() {
        assert!(narrows("b", "bc"));
        assert!(narrows("b", "b"));
        assert!(!narrows("bc", "b")); // shorter isn't a narrowing
        assert!(narrows("src/a", "src/ab"));
        assert!(!narrows("a", "a/b")); // introduces a path separator: widening
    }

    #[tokio::test]
    async fn get_or_spawn_runs_producer_once_for_concurrent_callers() {
        let cache = PrefixCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);

        let (row_a, existed_a) = cache.get_or_spawn("x", "b", move || async move {
            calls2.fetch_add(1, Ordering::SeqCst);
            Arc::new(CachedResult { matches: Vec::new(), limit_hit: false })
        });
        assert!(!existed_a);

        let (row_b, existed_b) =
            cache.get_or_spawn("x", "b", || async { unreachable!("producer must not rerun") });
        assert!(existed_b);

        let (a, b) = tokio::join!(row_a.get(), row_b.get());
        assert_eq!(a.matches.len(), 0);
        assert_eq!(b.matches.len(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_drops_the_whole_bucket() {
        let cache = PrefixCache::new();
        cache.get_or_spawn("x", "b", || async {
            Arc::new(CachedResult { matches: Vec::new(), limit_hit: false })
        });
        assert!(cache.find_narrowing("x", "bc").is_some());
        cache.clear("x");
        assert!(cache.find_narrowing("x", "bc").is_none());
    }

    #[tokio::test]
    async fn row_survives_drop_of_its_creating_awaiter() {
        let cache = PrefixCache::new();
        let (row, _) = cache.get_or_spawn("x", "b", || async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Arc::new(CachedResult { matches: vec![], limit_hit: true })
        });

        // Simulate the creating request being cancelled: start awaiting,
        // then drop that future before it resolves.
        {
            let fut = row.get();
            tokio::pin!(fut);
            let _ = futures::poll!(fut.as_mut());
        }

        // A later caller still observes the completed result.
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        let result = row.get().await;
        assert!(result.limit_hit);
    }
}
