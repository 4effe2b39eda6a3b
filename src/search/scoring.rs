//! Scoring & Cache (C7), scoring half: a fuzzy comparator backed by
//! `nucleo-matcher`'s `Matcher::fuzzy_match`, the same choice made
//! independently by the corpus's own file-search crates for the identical
//! job (see `SPEC_FULL.md` §4.7) — both bound their top-K selection to a
//! `BinaryHeap` rather than sorting the full candidate list.

use nucleo_matcher::{Config, Matcher, Utf32Str};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Fuzzy comparator `compare(a, b, query)` with a per-session scorer cache
/// keyed on `(candidate, query)` (spec §4.7).
pub struct FuzzyScorer {
    matcher: Matcher,
    cache: HashMap<(String, String), Option<u32>>,
}

impl Default for FuzzyScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzyScorer {
    pub fn new() -> Self {
        let mut config = Config::DEFAULT;
        config.set_match_paths();
        Self { matcher: Matcher::new(config), cache: HashMap::new() }
    }

    /// `None` means "does not fuzzy-match at all"; an empty query always
    /// matches with score 0 (matches every candidate, ranks them equally).
    pub fn score(&mut self, candidate: &str, query: &str) -> Option<u32> {
        if query.is_empty() {
            return Some(0);
        }
        let key = (candidate.to_string(), query.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return *cached;
        }
        let mut cbuf = Vec::new();
        let mut qbuf = Vec::new();
        let haystack = Utf32Str::new(candidate, &mut cbuf);
        let needle = Utf32Str::new(query, &mut qbuf);
        let score = self.matcher.fuzzy_match(haystack, needle);
        self.cache.insert(key, score);
        score
    }

    pub fn is_match(&mut self, candidate: &str, query: &str) -> bool {
        self.score(candidate, query).is_some()
    }

    /// Higher score first; ties broken lexicographically for a stable,
    /// reproducible order (spec §8 round-trip: "sorting a result set twice
    /// is stable").
    pub fn compare(&mut self, a: &str, b: &str, query: &str) -> std::cmp::Ordering {
        let sa = self.score(a, query).unwrap_or(0);
        let sb = self.score(b, query).unwrap_or(0);
        sb.cmp(&sa).then_with(|| a.cmp(b))
    }
}

/// Cheap ASCII-lowercase subsequence test, used as the walker's per-candidate
/// fuzzy-pattern gate (spec §4.3 step 4) so the hot path doesn't need a
/// `&mut Matcher` threaded through every traversal backend. The full
/// [`FuzzyScorer`] is reserved for the ranking pass once every candidate
/// from a walk is known (spec §4.7).
pub fn quick_filter(candidate: &str, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let mut needle = query.chars().flat_map(char::to_lowercase);
    let mut next = needle.next();
    for c in candidate.chars().flat_map(char::to_lowercase) {
        match next {
            Some(q) if c == q => next = needle.next(),
            Some(_) => {}
            None => break,
        }
    }
    next.is_none()
}

/// Partial sort yielding the top-K candidates by fuzzy score in
/// O(N log K), without sorting the tail (spec §4.7). `key_of` extracts the
/// string each item is scored against; ties are broken by that same key so
/// repeated calls are stable.
pub fn top_k<T>(
    items: Vec<T>,
    k: usize,
    scorer: &mut FuzzyScorer,
    query: &str,
    key_of: impl Fn(&T) -> &str,
) -> Vec<T> {
    if k == 0 || items.is_empty() {
        return Vec::new();
    }

    // Min-heap (via `Reverse`) over `(score, idx)`, bounded to size `k`:
    // the smallest-scoring kept entry surfaces first and gets evicted
    // when a better candidate arrives.
    let mut heap: BinaryHeap<Reverse<(i64, usize)>> = BinaryHeap::with_capacity(k + 1);
    for (idx, item) in items.iter().enumerate() {
        let score = i64::from(scorer.score(key_of(item), query).unwrap_or(0));
        heap.push(Reverse((score, idx)));
        if heap.len() > k {
            heap.pop();
        }
    }

    let mut kept: Vec<(i64, usize)> = heap.into_iter().map(|Reverse(t)| t).collect();
    kept.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    kept.into_iter()
        .map(|(_, idx)| slots[idx].take().expect("each index selected at most once"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_filter_is_subsequence_case_insensitive() {
        assert!(quick_filter("BarBaz", "bb"));
        assert!(quick_filter("bab", "bb"));
        assert!(!quick_filter("abc", "xz"));
        assert!(quick_filter("anything", ""));
    }

    #[test]
    fn top_k_prefers_higher_score_and_is_stable() {
        // Scenario 5 (spec §8): files `bab, bbc, abb`, pattern "bb",
        // maxResults=2 -> [bbc, bab] in that order.
        let mut scorer = FuzzyScorer::new();
        let items = vec!["bab".to_string(), "bbc".to_string(), "abb".to_string()];
        let ranked = top_k(items, 2, &mut scorer, "bb", |s| s.as_str());
        assert_eq!(ranked, vec!["bbc".to_string(), "bab".to_string()]);
    }

    #[test]
    fn top_k_caps_at_k_even_with_more_candidates() {
        let mut scorer = FuzzyScorer::new();
        let items: Vec<String> = (0..20).map(|i| format!("file{i}.rs")).collect();
        let ranked = top_k(items, 5, &mut scorer, "file", |s| s.as_str());
        assert_eq!(ranked.len(), 5);
    }
}
